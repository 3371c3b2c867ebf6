//! Minimal `--flag value` parsing.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgError {
    #[error("Missing value for {0}")]
    MissingValue(String),
    #[error("Unknown argument: {0}")]
    Unknown(String),
    #[error("Invalid value for {flag}: {value}")]
    Invalid { flag: String, value: String },
}

/// Flags following a subcommand.
#[derive(Debug, Default)]
pub struct Args {
    values: HashMap<String, String>,
    switches: Vec<String>,
}

impl Args {
    /// Parse `rest` given which flags take a value and which are switches.
    pub fn parse(rest: &[String], valued: &[&str], switches: &[&str]) -> Result<Self, ArgError> {
        let mut args = Self::default();
        let mut i = 0;
        while i < rest.len() {
            let flag = rest[i].as_str();
            if valued.contains(&flag) {
                let value = rest
                    .get(i + 1)
                    .ok_or_else(|| ArgError::MissingValue(flag.to_string()))?;
                args.values.insert(flag.to_string(), value.clone());
                i += 2;
            } else if switches.contains(&flag) {
                args.switches.push(flag.to_string());
                i += 1;
            } else {
                return Err(ArgError::Unknown(flag.to_string()));
            }
        }
        Ok(args)
    }

    pub fn value(&self, flag: &str) -> Option<&str> {
        self.values.get(flag).map(String::as_str)
    }

    pub fn parsed<T: std::str::FromStr>(&self, flag: &str) -> Result<Option<T>, ArgError> {
        match self.value(flag) {
            None => Ok(None),
            Some(v) => v.parse().map(Some).map_err(|_| ArgError::Invalid {
                flag: flag.to_string(),
                value: v.to_string(),
            }),
        }
    }

    pub fn has(&self, switch: &str) -> bool {
        self.switches.iter().any(|s| s == switch)
    }
}
