//! Kubernetes access for reading, re-creating and deleting resources.
//!
//! Everything here talks to the API server through kube-rs. The only thing
//! that shells out is the PVC data copy in [`transfer`].

pub mod client;
pub mod handlers;
pub mod overwrite;
pub mod sanitize;
pub mod transfer;
pub mod volume;

/// Whether a failed create means the object is already there.
///
/// The server normally says so in `reason`; a bare 409 without a reason is
/// treated the same way.
pub fn is_already_exists(err: &kube::Error) -> bool {
	match err {
		kube::Error::Api(status) => status_means_already_exists(status.code, &status.reason),
		_ => false,
	}
}

fn status_means_already_exists(code: u16, reason: &str) -> bool {
	reason == "AlreadyExists" || (code == 409 && reason.is_empty())
}

/// The most specific message available for an error.
///
/// API errors carry a human-readable `message` from the server; anything else
/// falls back to the error's own text.
pub fn api_message(err: &kube::Error) -> String {
	match err {
		kube::Error::Api(status) if !status.message.is_empty() => status.message.clone(),
		other => other.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case(409, "AlreadyExists", true)]
	#[case(409, "", true)]
	#[case(409, "Conflict", false)]
	#[case(403, "Forbidden", false)]
	#[case(500, "AlreadyExists", true)]
	#[case(404, "", false)]
	fn test_already_exists_classification(#[case] code: u16, #[case] reason: &str, #[case] expected: bool) {
		assert_eq!(status_means_already_exists(code, reason), expected);
	}
}
