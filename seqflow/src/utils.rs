//! Small helpers shared across the workflow machinery.

use rand::Rng;

/// Generates a timestamp string like `2026_0806_1412_K3F9A`.
///
/// A short random suffix of `rand_suffix_len` characters is appended for
/// uniqueness; pass 0 to omit it. Used as the default run id.
#[must_use]
pub fn timestamp(rand_suffix_len: usize) -> String {
    let mut result = chrono::Local::now().format("%Y_%m%d_%H%M").to_string();
    if rand_suffix_len > 0 {
        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..rand_suffix_len)
            .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
            .collect();
        result.push('_');
        result.push_str(&suffix);
    }
    result
}

/// Slugifies a string for use in display names and job descriptions.
///
/// ```
/// assert_eq!(seqflow::utils::slugify("Hello World"), "hello-world");
/// ```
#[must_use]
#[allow(clippy::expect_used)]
pub fn slugify(line: &str) -> String {
    let strip = regex::Regex::new(r"[^\w\s-]").expect("static pattern");
    let collapse = regex::Regex::new(r"[-\s]+").expect("static pattern");
    let stripped = strip.replace_all(line, "");
    collapse.replace_all(stripped.trim(), "-").to_lowercase()
}
