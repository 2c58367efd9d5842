pub mod bag;
pub mod cohort;
pub mod data;
pub mod dict;
pub mod learn;
pub mod sweep;
