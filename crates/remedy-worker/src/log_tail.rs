// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

/// Byte cap on a tail, applied after the line cap.
pub const MAX_TAIL_BYTES: usize = 4096;

/// Last `lines` lines of sandbox output, trimmed to [`MAX_TAIL_BYTES`].
pub fn tail(logs: &str, lines: usize) -> &str {
	if lines == 0 {
		return "";
	}
	let trimmed = logs.trim_end_matches(['\n', '\r']);
	let start = trimmed
		.rmatch_indices('\n')
		.nth(lines - 1)
		.map(|(idx, _)| idx + 1)
		.unwrap_or(0);

	let mut tail = &trimmed[start..];
	if tail.len() > MAX_TAIL_BYTES {
		let mut cut = tail.len() - MAX_TAIL_BYTES;
		while !tail.is_char_boundary(cut) {
			cut += 1;
		}
		tail = &tail[cut..];
	}
	tail
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn keeps_the_last_lines() {
		let logs = "one\ntwo\nthree\nfour\n";
		assert_eq!(tail(logs, 2), "three\nfour");
	}

	#[test]
	fn short_logs_are_returned_whole() {
		assert_eq!(tail("only line", 40), "only line");
		assert_eq!(tail("a\nb\n", 40), "a\nb");
		assert_eq!(tail("", 40), "");
	}

	#[test]
	fn exact_line_count_is_returned_whole() {
		assert_eq!(tail("a\nb\nc", 3), "a\nb\nc");
	}

	#[test]
	fn zero_lines_is_empty() {
		assert_eq!(tail("a\nb", 0), "");
	}

	#[test]
	fn long_lines_are_capped_on_a_char_boundary() {
		let logs = "é".repeat(MAX_TAIL_BYTES);
		let out = tail(&logs, 40);
		assert!(out.len() <= MAX_TAIL_BYTES);
		assert!(out.chars().all(|c| c == 'é'));
	}
}
