//! Winnow parsers for the line-level exposition grammar.
//!
//! The grammar here is deliberately line-shaped rather than a full exposition
//! format grammar: the proxy only needs to recognize a sample line well
//! enough to splice labels into it. Values and timestamps are captured as
//! opaque tokens and never reinterpreted.
use super::{
    LabelSet,
    SampleLine,
};
use winnow::{
    ascii::{
        escaped,
        space0,
    },
    combinator::{
        cut_err,
        delimited,
        eof,
        opt,
        preceded,
        separated,
        terminated,
    },
    stream::Accumulate,
    token::{
        none_of,
        one_of,
        take_till,
        take_while,
    },
    PResult,
    Parser,
};

/// Parse a metric name: `[a-zA-Z_][a-zA-Z0-9_:]*`.
fn name_parser(input: &mut &str) -> PResult<String> {
    let start_group = ('a'..='z', 'A'..='Z', '_');
    let rest_group = ('a'..='z', 'A'..='Z', '0'..='9', '_', ':');
    (one_of(start_group), take_while(0.., rest_group))
        .map(|(ch, rest)| format!("{ch}{rest}"))
        .parse_next(input)
}

/// Parse a quoted label value.
///
/// The value may contain any character except an unescaped `"`, including
/// `,` and `=`. Escape sequences are kept raw so the value round-trips
/// byte-identically.
///
/// Examples:
///
/// * `"Test"`
/// * `"bear,,,bla"`
fn label_value_parser(input: &mut &str) -> PResult<String> {
    let escaped = escaped(none_of(br#""\"#), '\\', one_of(br#""n\"#));
    preceded('\"', cut_err(terminated(escaped, '\"')))
        .parse_to()
        .parse_next(input)
}

/// Parse one label key value pair.
///
/// Examples:
///
/// * `key1="value1"`
/// * `key = "value"`
fn label_key_value_parser(input: &mut &str) -> PResult<(String, String)> {
    let key = name_parser.parse_next(input)?;
    let _ = (space0, '=', space0).parse_next(input)?;
    let val = label_value_parser.parse_next(input)?;
    Ok((key, val))
}

// Enable us to collect the key value pairs straight into a `LabelSet`.
// On a repeated key within one block the last occurrence wins.
impl Accumulate<(String, String)> for LabelSet {
    fn initial(_capacity: Option<usize>) -> Self {
        Self::default()
    }

    fn accumulate(&mut self, acc: (String, String)) {
        self.insert(acc.0, acc.1);
    }
}

/// Parse a label block delimited by braces. An empty block `{}` is not
/// valid: at least one pair is required.
///
/// Examples:
/// * `{key1="value1",key2="value2"}`
/// * `{ key1="value1", key2 = "value2" }`
fn label_block_parser(input: &mut &str) -> PResult<LabelSet> {
    let separator = (space0, ',', space0);
    let list = separated(1.., label_key_value_parser, separator);
    let start_delimiter = ("{", space0);
    let end_delimiter = (space0, "}");
    let mut labels = delimited(start_delimiter, list, end_delimiter);
    labels.parse_next(input)
}

/// Parse a whitespace-separated value or timestamp token. The token is
/// opaque: anything up to the next space.
fn token_parser(input: &mut &str) -> PResult<String> {
    take_till(1.., ' ').parse_to().parse_next(input)
}

/// Parse a full sample line: name, optional label block, one mandatory
/// value token, one optional timestamp token.
///
/// Examples:
/// * `data_sent:bytes{th_id="worker_0",type="duplex"} 1395`
/// * `metric_without_timestamp_and_labels 12.47`
/// * `up 1 1395066363000`
fn sample_line_parser(input: &mut &str) -> PResult<SampleLine> {
    let name = name_parser.parse_next(input)?;
    let labels = opt(label_block_parser).parse_next(input)?;
    let _ = ' '.parse_next(input)?;
    let value = token_parser.parse_next(input)?;
    let timestamp = opt(preceded(' ', token_parser)).parse_next(input)?;
    eof.parse_next(input)?;
    Ok(SampleLine::new(name, labels, value, timestamp))
}

/// Parse one payload line as a sample line, anchored to the full line.
///
/// Returns `None` when the line does not match the sample shape; the caller
/// decides what to do with such lines (the injection engine passes them
/// through verbatim and counts them).
pub fn parse_sample_line(input: &str) -> Option<SampleLine> {
    sample_line_parser.parse(input).ok()
}

/// Parse a `{k="v",...}` label block string into a `LabelSet`, anchored to
/// the full input.
pub fn parse_label_set(input: &str) -> Option<LabelSet> {
    label_block_parser.parse(input).ok()
}

#[cfg(test)]
mod tests {
    use super::{
        label_block_parser,
        label_key_value_parser,
        label_value_parser,
        name_parser,
        parse_label_set,
        parse_sample_line,
        sample_line_parser,
        token_parser,
    };
    use crate::{
        tests::init_test_logging,
        LabelSet,
    };
    use pretty_assertions::assert_eq;
    use tracing::info;
    use winnow::Parser;

    #[test]
    fn test_name_parser() {
        init_test_logging();

        let success_cases = [
            ("key1", "key1"),
            ("a:b:c", "a:b:c"),
            ("d33", "d33"),
            ("a_233:3:", "a_233:3:"),
            ("_up", "_up"),
        ];
        for (expr, expected) in success_cases {
            info!("Testing successful expr: '{expr}'");
            let matched = name_parser.parse(expr).unwrap();
            assert_eq!(matched, expected);
        }
        let error_cases = ["", "112_abc", ":ab", "a-b", "test with space"];
        for expr in error_cases {
            info!("Testing failure expr: '{expr}'");
            assert!(name_parser.parse(expr).is_err());
        }
    }

    #[test]
    fn test_label_value_parser() {
        init_test_logging();

        let success_cases = [
            (r#""Test""#, "Test"),
            (r#""bear,,,bla""#, "bear,,,bla"),
            (r#""bear===bla""#, "bear===bla"),
            (r#""""#, ""),
            (
                r#""Cannot find file:\n\"FILE.TXT\"""#,
                r#"Cannot find file:\n\"FILE.TXT\""#,
            ),
        ];
        for (expr, expected) in success_cases {
            info!("Testing successful expr: '{expr}'");
            let matched = label_value_parser.parse(expr).unwrap();
            assert_eq!(matched, expected);
        }
        let error_cases = ["", "\"", "\"some string"];
        for expr in error_cases {
            info!("Testing failure expr: '{expr}'");
            assert!(label_value_parser.parse(expr).is_err());
        }
    }

    #[test]
    fn test_label_key_value_parser() {
        init_test_logging();

        let success_cases = [
            (r#"key1="Test""#, ("key1", "Test")),
            (r#"key1  = "Test""#, ("key1", "Test")),
            (r#"key1="""#, ("key1", "")),
        ];
        for (expr, (key, val)) in success_cases {
            info!("Testing successful expr: '{expr}'");
            let (recv_key, recv_val) = label_key_value_parser.parse(expr).unwrap();
            assert_eq!(key, recv_key);
            assert_eq!(val, recv_val);
        }
        let error_cases = [
            "",
            r#"key1="Test"#,
            r#""key1"="Test""#,
            "key1=",
            r#"key1 "Test""#,
        ];
        for expr in error_cases {
            info!("Testing failure expr: '{expr}'");
            assert!(label_key_value_parser.parse(expr).is_err());
        }
    }

    #[test]
    fn test_label_block_parser() {
        init_test_logging();

        let success_cases = [
            r#"{key1="value1",key2="value2"}"#,
            r#"{key1="value1", key2 = "value2"}"#,
            r#"{ key1  =  "value1",    key2 = "value2" }"#,
        ];
        for expr in success_cases {
            info!("Testing successful expr: '{expr}'");
            let labels = label_block_parser.parse(expr).unwrap();
            let expected = LabelSet::from_iter([("key1", "value1"), ("key2", "value2")]);
            assert_eq!(labels, expected);
        }

        let error_cases = ["", "{}", r#"{key1="value1",key2="value2""#];
        for expr in error_cases {
            info!("Testing failure expr: '{expr}'");
            assert!(label_block_parser.parse(expr).is_err());
        }
    }

    #[test]
    fn test_label_block_with_embedded_delimiters() {
        init_test_logging();

        let labels = parse_label_set(r#"{foo="bar",boo="bear,,,bla"}"#).unwrap();
        let expected = LabelSet::from_iter([("foo", "bar"), ("boo", "bear,,,bla")]);
        assert_eq!(labels, expected);

        let labels = parse_label_set(r#"{foo="bar",boo="bear===bla"}"#).unwrap();
        let expected = LabelSet::from_iter([("foo", "bar"), ("boo", "bear===bla")]);
        assert_eq!(labels, expected);
    }

    #[test]
    fn test_token_parser() {
        init_test_logging();

        let success_cases = [
            ("1027", "1027"),
            ("+Inf", "+Inf"),
            ("NaN", "NaN"),
            ("1.458255915e9", "1.458255915e9"),
        ];
        for (expr, expected) in success_cases {
            info!("Testing successful expr: '{expr}'");
            let matched = token_parser.parse(expr).unwrap();
            assert_eq!(matched, expected);
        }
        assert!(token_parser.parse("").is_err());
        assert!(token_parser.parse("12 34").is_err());
    }

    #[test]
    fn test_sample_line_parser() {
        init_test_logging();

        let expr = r#"data_sent:bytes{th_id="worker_0",type="duplex"} 1395 -1"#;
        let sample = sample_line_parser.parse(expr).unwrap();
        assert_eq!(sample.name, "data_sent:bytes");
        assert_eq!(
            sample.labels,
            Some(LabelSet::from_iter([
                ("th_id", "worker_0"),
                ("type", "duplex"),
            ]))
        );
        assert_eq!(sample.value, "1395");
        assert_eq!(sample.timestamp.as_deref(), Some("-1"));
    }

    #[test]
    fn test_sample_line_parser_without_labels_or_timestamp() {
        init_test_logging();

        let sample = parse_sample_line("metric_without_timestamp_and_labels 12.47").unwrap();
        assert_eq!(sample.name, "metric_without_timestamp_and_labels");
        assert_eq!(sample.labels, None);
        assert_eq!(sample.value, "12.47");
        assert_eq!(sample.timestamp, None);
    }

    #[test]
    fn test_sample_line_parser_failures() {
        init_test_logging();

        let cases = [
            "",
            r#"data_sent:bytes{th_id="worker_0"}"#,
            r#"data_sent:bytes{th_id="worker_0"} 1395 -1 some-more-text"#,
            "no_value_here{} 1",
            "1starts_with_digit 2",
            "two  spaces",
        ];
        for expr in cases {
            info!("Testing failure expr: '{expr}'");
            assert!(parse_sample_line(expr).is_none());
        }
    }

    #[test]
    fn test_repeated_key_in_block_last_wins() {
        init_test_logging();

        let labels = parse_label_set(r#"{a="1",a="2"}"#).unwrap();
        assert_eq!(labels, LabelSet::from_iter([("a", "2")]));
    }
}
