//! Locale defaulting, transcribed from `GetSystemLocaleFn` /
//! `SetDefaultLocaleFn` in the original `gpctl` source: when the
//! operator config omits `locale` entirely, read it off the admin
//! host's own environment instead of leaving the engine to guess.
use meshctl_rpc::Locale;
use meshctl_util::capabilities::ProcessRunner;
use meshctl_util::error::Error;

/// Parse `/usr/bin/locale`'s `KEY="VALUE"` output into a `Locale`. Any
/// field the command didn't print is left at its zero value.
fn parse_locale_output(output: &str) -> Locale {
	let mut locale = Locale::default();
	for line in output.lines() {
		let Some((key, value)) = line.split_once('=') else {
			continue;
		};
		let value = value.trim().trim_matches('"').to_string();
		match key.trim() {
			"LC_ALL" => locale.lc_all = value,
			"LC_COLLATE" => locale.lc_collate = value,
			"LC_CTYPE" => locale.lc_ctype = value,
			"LC_MESSAGES" => locale.lc_messages = value,
			"LC_MONETARY" => locale.lc_monetary = value,
			"LC_NUMERIC" => locale.lc_numeric = value,
			"LC_TIME" => locale.lc_time = value,
			_ => {}
		}
	}
	locale
}

/// Shell out to `/usr/bin/locale` on the admin host and fill all seven
/// `Locale` fields from its output.
pub async fn system_locale(process: &dyn ProcessRunner) -> Result<Locale, Error> {
	let output = process.run("/usr/bin/locale", &[]).await?;
	if !output.success() {
		return Err(Error::Message(format!(
			"failed to get locale on this system: {}",
			String::from_utf8_lossy(&output.stderr)
		)));
	}
	Ok(parse_locale_output(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn parses_quoted_key_value_pairs() {
		let output = "LC_CTYPE=\"en_US.UTF-8\"\nLC_NUMERIC=\"en_US.UTF-8\"\nLC_ALL=\n";
		let locale = parse_locale_output(output);
		assert_eq!(locale.lc_ctype, "en_US.UTF-8");
		assert_eq!(locale.lc_numeric, "en_US.UTF-8");
		assert_eq!(locale.lc_all, "");
	}

	#[test]
	fn ignores_unrelated_lines() {
		let locale = parse_locale_output("not a kv line\nLC_TIME=\"C\"");
		assert_eq!(locale.lc_time, "C");
		assert_eq!(locale.lc_collate, "");
	}
}
