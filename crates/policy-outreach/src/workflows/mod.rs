pub mod matching;
pub mod policy;
