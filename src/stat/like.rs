use crate::config::LikeSelectivityConfig;

/// Default scale factor of `column LIKE pattern` derived from the shape of the pattern.
///
/// Every literal character is selective, though less so the longer the literal run gets.
/// Leading `%` adds nothing, `_` matches almost anything and a pattern not ending in `%` is
/// anchored at the end.
pub fn like_scale_factor(config: &LikeSelectivityConfig, pattern: &str) -> f64 {
    let mut selectivity = 1.0;
    let mut fixed_char = config.fixed_char_selectivity;
    let mut chars = pattern.chars().peekable();

    let mut last_is_wildcard = false;
    while chars.peek() == Some(&'%') {
        chars.next();
        last_is_wildcard = true;
    }

    while let Some(c) = chars.next() {
        last_is_wildcard = false;
        match c {
            '%' => last_is_wildcard = true,
            '_' => selectivity *= config.any_char_selectivity,
            c => {
                if c == '\\' {
                    // the escaped character counts as a literal
                    chars.next();
                }
                selectivity *= fixed_char;
                fixed_char += (1.0 - fixed_char) * config.fixed_char_rolloff;
            }
        }
    }
    if !last_is_wildcard {
        selectivity *= config.anchor_selectivity;
    }

    (1.0 / selectivity).min(config.max_scale_factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(expected: f64, actual: f64) {
        assert!(
            (expected - actual).abs() < 0.05,
            "expected {} got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_prefix_patterns() {
        let config = LikeSelectivityConfig::default();
        assert_close(5.0, like_scale_factor(&config, "a%"));
        assert_close(39.3, like_scale_factor(&config, "abc%"));
        assert_close(41.3, like_scale_factor(&config, "abc"));
    }

    #[test]
    fn test_more_literals_are_more_selective() {
        let config = LikeSelectivityConfig::default();
        let a = like_scale_factor(&config, "a%");
        let abc = like_scale_factor(&config, "abc%");
        let anchored = like_scale_factor(&config, "abc");
        assert!(a < abc);
        assert!(abc < anchored);
    }

    #[test]
    fn test_wildcards() {
        let config = LikeSelectivityConfig::default();
        assert_close(1.0, like_scale_factor(&config, "%"));
        assert_close(1.0 / 0.99, like_scale_factor(&config, "%_%"));
        assert_eq!(
            like_scale_factor(&config, "a%"),
            like_scale_factor(&config, "%%a%")
        );
        assert_close(5.0, like_scale_factor(&config, "\\%%"));
        let long = "abcdefghijklmnopqrstuvwxyz".repeat(4);
        assert_eq!(config.max_scale_factor, like_scale_factor(&config, &long));
    }
}
