//! Value objects

mod snowflake;

pub use snowflake::{Snowflake, SnowflakeParseError};
