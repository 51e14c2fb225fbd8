//! When booting, the kernel can take command line arguments. This module
//! implements a parser for them.

use core::cmp::min;
use core::fmt;
use core::str;

/// Skips spaces in `slice`, starting at offset `i`.
fn skip_spaces(slice: &[u8], i: &mut usize) {
	let mut j = *i;
	while j < slice.len() && (slice[j] as char).is_ascii_whitespace() {
		j += 1;
	}
	*i = j;
}

/// Parses the number represented by `slice`.
fn parse_nbr(slice: &[u8]) -> Option<u32> {
	str::from_utf8(slice).ok().and_then(|s| s.parse().ok())
}

/// A command-line parsing error.
#[derive(Debug)]
pub struct ParseError<'s> {
	cmdline: &'s [u8],
	err: &'static str,
	token: Option<(usize, usize)>,
}

impl<'s> ParseError<'s> {
	pub fn new(cmdline: &'s [u8], err: &'static str, token: Option<(usize, usize)>) -> Self {
		Self {
			cmdline,
			err,
			token,
		}
	}
}

impl<'s> fmt::Display for ParseError<'s> {
	fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
		write!(
			fmt,
			"invalid kernel command line: {} ({})",
			self.err,
			core::str::from_utf8(self.cmdline).unwrap_or("<invalid utf8>")
		)?;
		let _ = self.token;
		Ok(())
	}
}

struct Token<'s> {
	s: &'s [u8],
	begin: usize,
}

struct TokenIterator<'s> {
	s: &'s [u8],
	i: usize,
}

impl<'s> Iterator for TokenIterator<'s> {
	type Item = Token<'s>;

	fn next(&mut self) -> Option<Self::Item> {
		skip_spaces(self.s, &mut self.i);
		let mut j = self.i;
		while j < self.s.len() && !(self.s[j] as char).is_ascii_whitespace() {
			j += 1;
		}

		if j > self.i {
			let tok = Token {
				s: &self.s[self.i..j],
				begin: self.i,
			};
			self.i = j;
			Some(tok)
		} else {
			None
		}
	}
}

/// Parsed boot command-line options.
///
/// Every byte in the command line is interpreted as ASCII.
pub struct ArgsParser<'s> {
	/// The root device's major/minor numbers, per `-root major minor`.
	root: Option<(u32, u32)>,
	/// The path to the init binary, per `-init path`, if specified.
	init: Option<&'s [u8]>,
	/// Whether the kernel boots silently (`-silent`).
	silent: bool,
}

impl<'s> ArgsParser<'s> {
	/// Parses `cmdline` into a new instance.
	pub fn parse(cmdline: &'s [u8]) -> Result<Self, ParseError<'s>> {
		let mut s = Self {
			root: None,
			init: None,
			silent: false,
		};

		let mut iter = TokenIterator { s: cmdline, i: 0 };
		loop {
			let Some(token) = iter.next() else {
				break;
			};

			match token.s {
				b"-root" => {
					let (Some(major), Some(minor)) = (iter.next(), iter.next()) else {
						return Err(ParseError::new(
							cmdline,
							"not enough arguments for `-root`",
							Some((token.begin, token.s.len())),
						));
					};
					let Some(major) = parse_nbr(major.s) else {
						return Err(ParseError::new(cmdline, "invalid major number", None));
					};
					let Some(minor) = parse_nbr(minor.s) else {
						return Err(ParseError::new(cmdline, "invalid minor number", None));
					};
					s.root = Some((major, minor));
				}

				b"-init" => {
					let Some(init) = iter.next() else {
						return Err(ParseError::new(
							cmdline,
							"not enough arguments for `-init`",
							Some((token.begin, token.s.len())),
						));
					};
					s.init = Some(init.s);
				}

				b"-silent" => s.silent = true,

				_ => {
					return Err(ParseError::new(
						cmdline,
						"invalid argument",
						Some((token.begin, token.s.len())),
					));
				}
			}
		}

		Ok(s)
	}

	/// Returns the major and minor numbers of the root device, if given.
	pub fn root_dev(&self) -> Option<(u32, u32)> {
		self.root
	}

	/// Returns the init binary path, if given.
	pub fn init_path(&self) -> Option<&'s [u8]> {
		self.init
	}

	/// Whether the kernel should suppress console echo of the logger.
	pub fn is_silent(&self) -> bool {
		self.silent
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn cmdline_rejects_unknown_flag() {
		assert!(ArgsParser::parse(b"-bleh").is_err());
	}

	#[test_case]
	fn cmdline_rejects_incomplete_root() {
		assert!(ArgsParser::parse(b"-root -bleh").is_err());
	}

	#[test_case]
	fn cmdline_accepts_root() {
		let p = ArgsParser::parse(b"-root 1 0").unwrap();
		assert_eq!(p.root_dev(), Some((1, 0)));
	}

	#[test_case]
	fn cmdline_accepts_root_and_silent() {
		let p = ArgsParser::parse(b"-root 1 0 -silent").unwrap();
		assert_eq!(p.root_dev(), Some((1, 0)));
		assert!(p.is_silent());
	}

	#[test_case]
	fn cmdline_rejects_incomplete_init() {
		assert!(ArgsParser::parse(b"-root 1 0 -init").is_err());
	}

	#[test_case]
	fn cmdline_accepts_init() {
		let p = ArgsParser::parse(b"-root 1 0 -init /sbin/init -silent").unwrap();
		assert_eq!(p.init_path(), Some(&b"/sbin/init"[..]));
	}
}
