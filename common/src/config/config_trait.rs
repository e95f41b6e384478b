use super::{Lookup, env_lookup};
use anyhow::Error;

pub trait ConfigTrait: Clone + std::fmt::Display {
    fn from_lookup(lookup: Lookup) -> Result<Self, Error>
    where
        Self: Sized;

    /// Loads `.env` when present, then reads the process environment.
    fn read_env_variables() -> Result<Self, Error>
    where
        Self: Sized,
    {
        dotenvy::dotenv().ok();
        Self::from_lookup(&env_lookup)
    }
}
