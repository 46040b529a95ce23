use std::{
    convert::Infallible, env::VarError, net::IpAddr, num::ParseIntError, path::PathBuf,
    str::FromStr, time::Duration,
};

/// Details about an environment variable. Used by [`FromEnv::inventory`] to
/// describe configuration, and by [`FromEnv::check_inventory`] to report
/// missing variables before loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvItemInfo {
    /// The environment variable name.
    pub var: &'static str,
    /// What the variable controls.
    pub description: &'static str,
    /// Whether the variable may be left unset.
    pub optional: bool,
}

/// Error type for loading from the environment. See the [`FromEnv`] trait for
/// more information.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FromEnvErr<Inner> {
    /// The environment variable is missing or not unicode.
    #[error("Error reading variable {0}: {1}")]
    EnvError(String, VarError),
    /// The environment variable is empty.
    #[error("Environment variable {0} is empty")]
    Empty(String),
    /// The environment variable is present, but the value could not be parsed.
    #[error("Failed to parse environment variable: {0}")]
    ParseError(#[from] Inner),
}

impl FromEnvErr<Infallible> {
    /// Convert an error from an infallible parse into another error type.
    pub fn infallible_into<T>(self) -> FromEnvErr<T> {
        match self {
            Self::EnvError(s, e) => FromEnvErr::EnvError(s, e),
            Self::Empty(s) => FromEnvErr::Empty(s),
            Self::ParseError(never) => match never {},
        }
    }
}

impl<Inner> FromEnvErr<Inner> {
    /// Map the parse error to another type, keeping the variable information
    /// intact.
    pub fn map<New>(self, f: impl FnOnce(Inner) -> New) -> FromEnvErr<New> {
        match self {
            Self::EnvError(s, e) => FromEnvErr::EnvError(s, e),
            Self::Empty(s) => FromEnvErr::Empty(s),
            Self::ParseError(e) => FromEnvErr::ParseError(f(e)),
        }
    }

    /// Missing env var.
    pub fn env_err(var: &str, e: VarError) -> Self {
        Self::EnvError(var.to_string(), e)
    }

    /// Empty env var.
    pub fn empty(var: &str) -> Self {
        Self::Empty(var.to_string())
    }

    /// Error while parsing.
    pub const fn parse_error(err: Inner) -> Self {
        Self::ParseError(err)
    }

    /// True if the variable was absent or empty, rather than unparseable.
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::EnvError(_, VarError::NotPresent) | Self::Empty(_))
    }
}

/// Parse a value from the environment, failing if the variable is absent or
/// empty.
pub fn parse_env_if_present<T: FromStr>(env_var: &str) -> Result<T, FromEnvErr<T::Err>> {
    let s = std::env::var(env_var).map_err(|e| FromEnvErr::env_err(env_var, e))?;

    if s.is_empty() {
        Err(FromEnvErr::empty(env_var))
    } else {
        s.parse().map_err(Into::into)
    }
}

/// Trait for configuration structs loaded from fixed environment variables.
pub trait FromEnv: core::fmt::Debug + Sized + 'static {
    /// Error type produced when a variable fails to parse.
    type Error: core::error::Error + Clone;

    /// Every environment variable this type reads, including optional ones.
    fn inventory() -> Vec<&'static EnvItemInfo>;

    /// Check the inventory, returning every required variable that is not
    /// set.
    fn check_inventory() -> Result<(), Vec<&'static EnvItemInfo>> {
        let missing: Vec<_> = Self::inventory()
            .into_iter()
            .filter(|item| !item.optional && std::env::var(item.var).is_err())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }

    /// Load from the environment.
    fn from_env() -> Result<Self, FromEnvErr<Self::Error>>;
}

/// Trait for primitives that correspond to a single environment variable.
pub trait FromEnvVar: core::fmt::Debug + Sized + 'static {
    /// Error type produced when parsing the primitive.
    type Error: core::error::Error;

    /// Load the primitive from the environment at the given variable.
    fn from_env_var(env_var: &str) -> Result<Self, FromEnvErr<Self::Error>>;

    /// Load the primitive, falling back to `default` when the variable is
    /// absent or empty. Parse failures are still reported.
    fn from_env_var_or(env_var: &str, default: Self) -> Result<Self, FromEnvErr<Self::Error>> {
        match Self::from_env_var(env_var) {
            Err(e) if e.is_missing() => Ok(default),
            other => other,
        }
    }
}

impl<T> FromEnvVar for Option<T>
where
    T: FromEnvVar,
{
    type Error = T::Error;

    fn from_env_var(env_var: &str) -> Result<Self, FromEnvErr<Self::Error>> {
        match std::env::var(env_var) {
            Ok(s) if s.is_empty() => Ok(None),
            Ok(_) => T::from_env_var(env_var).map(Some),
            Err(_) => Ok(None),
        }
    }
}

impl FromEnvVar for String {
    type Error = Infallible;

    fn from_env_var(env_var: &str) -> Result<Self, FromEnvErr<Self::Error>> {
        parse_env_if_present(env_var)
    }
}

/// Durations are read as whole seconds.
impl FromEnvVar for Duration {
    type Error = ParseIntError;

    fn from_env_var(env_var: &str) -> Result<Self, FromEnvErr<Self::Error>> {
        u64::from_env_var(env_var).map(Self::from_secs)
    }
}

macro_rules! impl_for_parseable {
    ($($t:ty),*) => {
        $(
            impl FromEnvVar for $t {
                type Error = <$t as FromStr>::Err;

                fn from_env_var(env_var: &str) -> Result<Self, FromEnvErr<Self::Error>> {
                    parse_env_if_present(env_var)
                }
            }
        )*
    }
}

impl_for_parseable!(u16, u64, IpAddr, PathBuf, url::Url);

/// Any non-empty value counts as `true`.
impl FromEnvVar for bool {
    type Error = std::str::ParseBoolError;

    fn from_env_var(env_var: &str) -> Result<Self, FromEnvErr<Self::Error>> {
        let s = std::env::var(env_var).map_err(|e| FromEnvErr::env_err(env_var, e))?;
        Ok(!s.is_empty())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn set<T: ToString>(env: &str, val: &T) {
        std::env::set_var(env, val.to_string());
    }

    fn roundtrip<T>(env: &str, val: T)
    where
        T: ToString + FromEnvVar + PartialEq + std::fmt::Debug,
    {
        set(env, &val);
        assert_eq!(T::from_env_var(env).unwrap(), val);
    }

    #[test]
    #[serial_test::serial]
    fn test_primitives() {
        roundtrip("PORTFOLIO_TEST_U16", 3000u16);
        roundtrip("PORTFOLIO_TEST_U64", 42u64);
        roundtrip("PORTFOLIO_TEST_STRING", "hello".to_string());
        roundtrip(
            "PORTFOLIO_TEST_URL",
            url::Url::parse("http://example.com/token").unwrap(),
        );
        roundtrip("PORTFOLIO_TEST_IP", "127.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    #[serial_test::serial]
    fn test_duration_is_seconds() {
        set("PORTFOLIO_TEST_DURATION", &60);
        assert_eq!(
            Duration::from_env_var("PORTFOLIO_TEST_DURATION").unwrap(),
            Duration::from_secs(60)
        );
    }

    #[test]
    #[serial_test::serial]
    fn test_empty_string_rejected() {
        set("PORTFOLIO_TEST_EMPTY", &"");
        assert_eq!(
            String::from_env_var("PORTFOLIO_TEST_EMPTY").unwrap_err(),
            FromEnvErr::empty("PORTFOLIO_TEST_EMPTY")
        );
    }

    #[test]
    #[serial_test::serial]
    fn test_defaults_only_cover_missing() {
        std::env::remove_var("PORTFOLIO_TEST_DEFAULTED");
        assert_eq!(u16::from_env_var_or("PORTFOLIO_TEST_DEFAULTED", 7).unwrap(), 7);

        set("PORTFOLIO_TEST_DEFAULTED", &"seven");
        let err = u16::from_env_var_or("PORTFOLIO_TEST_DEFAULTED", 7).unwrap_err();
        assert_eq!(
            err,
            FromEnvErr::parse_error("seven".parse::<u16>().unwrap_err())
        );
    }

    #[test]
    #[serial_test::serial]
    fn test_option_absent_is_none() {
        std::env::remove_var("PORTFOLIO_TEST_OPTION");
        assert_eq!(Option::<u64>::from_env_var("PORTFOLIO_TEST_OPTION").unwrap(), None);
    }
}
