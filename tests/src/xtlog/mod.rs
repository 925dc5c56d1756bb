mod test_recovery;
mod test_checkpoint;
mod test_data_log;
