mod test_codec;
mod test_signal_fifo;
mod test_ref_parity;
