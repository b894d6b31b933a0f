/// Turn a display name into a URL slug: lowercase ASCII alphanumerics with
/// single hyphens between words. "Science Fiction" becomes "science-fiction".
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic() {
        assert_eq!(slugify("Action"), "action");
        assert_eq!(slugify("Science Fiction"), "science-fiction");
    }

    #[test]
    fn punctuation_collapses() {
        assert_eq!(slugify("TV & Movie!"), "tv-movie");
        assert_eq!(slugify("  War  "), "war");
        assert_eq!(slugify("---"), "");
    }
}
