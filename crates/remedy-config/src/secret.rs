// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Redacted secret values and `VAR` / `VAR_FILE` environment loading.
//!
//! Credentials handed to the sandbox (LLM key, GitHub token) and the webhook
//! signing secret are held in [`Secret`] so they never reach the logs. Access
//! requires an explicit [`Secret::expose`].

use std::path::PathBuf;
use std::{env, fmt, fs};

use thiserror::Error;
use zeroize::Zeroize;

pub const REDACTED: &str = "[REDACTED]";

#[derive(Zeroize)]
#[zeroize(drop)]
pub struct Secret<T>
where
	T: Zeroize,
{
	inner: T,
}

pub type SecretString = Secret<String>;

impl<T> Secret<T>
where
	T: Zeroize,
{
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	pub fn expose(&self) -> &T {
		&self.inner
	}
}

impl<T> Clone for Secret<T>
where
	T: Zeroize + Clone,
{
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T> fmt::Debug for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Secret").field(&REDACTED).finish()
	}
}

impl<T> fmt::Display for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T> PartialEq for Secret<T>
where
	T: Zeroize + PartialEq,
{
	fn eq(&self, other: &Self) -> bool {
		self.inner == other.inner
	}
}

impl From<&str> for SecretString {
	fn from(value: &str) -> Self {
		Secret::new(value.to_string())
	}
}

#[derive(Debug, Error)]
pub enum SecretEnvError {
	#[error("failed to read secret file at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("secret file path in {var} is empty")]
	EmptyPath { var: String },
}

/// Loads a secret from `{var}_FILE` (a path) or `{var}` (the value).
///
/// The file variant wins when both are set. A single trailing newline is
/// stripped from file contents. Empty values are treated as unset.
pub fn load_secret_env(var: &str) -> Result<Option<SecretString>, SecretEnvError> {
	let file_var = format!("{var}_FILE");

	if let Ok(path_str) = env::var(&file_var) {
		if path_str.is_empty() {
			return Err(SecretEnvError::EmptyPath { var: file_var });
		}
		let path = PathBuf::from(path_str);
		let mut content = fs::read_to_string(&path).map_err(|source| SecretEnvError::Io {
			path: path.clone(),
			source,
		})?;
		if content.ends_with('\n') {
			content.pop();
			if content.ends_with('\r') {
				content.pop();
			}
		}
		if content.is_empty() {
			return Ok(None);
		}
		return Ok(Some(Secret::new(content)));
	}

	match env::var(var) {
		Ok(value) if !value.is_empty() => Ok(Some(Secret::new(value))),
		_ => Ok(None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn debug_and_display_are_redacted() {
		let secret = SecretString::from("ghp_abcdef");
		assert_eq!(format!("{secret:?}"), "Secret(\"[REDACTED]\")");
		assert_eq!(format!("{secret}"), "[REDACTED]");
		assert_eq!(secret.expose(), "ghp_abcdef");
	}

	#[test]
	fn loads_from_file_and_strips_newline() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "sk-from-file").unwrap();

		let var = "REMEDY_TEST_SECRET_FROM_FILE";
		env::set_var(format!("{var}_FILE"), file.path());
		env::set_var(var, "sk-from-env");
		let secret = load_secret_env(var).unwrap().unwrap();
		env::remove_var(format!("{var}_FILE"));
		env::remove_var(var);

		assert_eq!(secret.expose(), "sk-from-file");
	}

	#[test]
	fn missing_and_empty_values_are_none() {
		let var = "REMEDY_TEST_SECRET_UNSET";
		assert!(load_secret_env(var).unwrap().is_none());

		let var = "REMEDY_TEST_SECRET_EMPTY";
		env::set_var(var, "");
		assert!(load_secret_env(var).unwrap().is_none());
		env::remove_var(var);
	}

	#[test]
	fn empty_file_path_is_an_error() {
		let var = "REMEDY_TEST_SECRET_EMPTY_PATH";
		env::set_var(format!("{var}_FILE"), "");
		let result = load_secret_env(var);
		env::remove_var(format!("{var}_FILE"));
		assert!(matches!(result, Err(SecretEnvError::EmptyPath { .. })));
	}
}
