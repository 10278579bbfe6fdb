//! Checks of meta data files not included in the published package.

#[test]
fn html_root_url_matches_version() {
	version_sync::assert_html_root_url_updated!("src/lib.rs");
}

#[test]
fn readme_mentions_the_crate() {
	version_sync::assert_contains_regex!("README.md", "^# {name}$");
}
