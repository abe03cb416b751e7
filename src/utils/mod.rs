//! Utility modules shared across the build engine.

pub mod path;
pub mod walk;

/// Count with a naively pluralized noun: `1 page`, `3 pages`.
pub fn plural_count(count: usize, noun: &str) -> String {
    let suffix = if count == 1 { "" } else { "s" };
    format!("{count} {noun}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural_count() {
        assert_eq!(plural_count(0, "file"), "0 files");
        assert_eq!(plural_count(1, "page"), "1 page");
        assert_eq!(plural_count(3, "plugin"), "3 plugins");
    }
}
