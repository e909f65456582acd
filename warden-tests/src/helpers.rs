pub mod builders;
pub mod wait_utils;
