pub mod lqh_key;
pub mod tc_key;
pub mod alter_indx;
pub mod build_indx;
pub mod fail_rep;
pub mod continue_b;
pub mod synth;

/// Synthetic REF error code used when routing cannot reach the target:
/// missing worker instance, offline block, failed node.
pub const NF_FAKE_ERROR_REF: u32 = 414;
