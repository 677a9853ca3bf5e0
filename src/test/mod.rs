pub mod helpers;
pub mod test_completion;
pub mod test_csf_round_trip;
