//! Inline expressions.
//!
//! `ds_${0..1}.t_order_${['a', 'b']}` expands to the cartesian product of its
//! placeholders. `$->{...}` is accepted as an alias of `${...}`. Top-level
//! commas separate independent expressions.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ShardingError;

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:->)?\{([^{}]*)\}").expect("Invalid placeholder regex")
});

/// Expand `expression` into every concrete value it denotes, in order.
pub fn expand(expression: &str) -> Result<Vec<String>, ShardingError> {
    let mut values = Vec::new();
    for part in split_top_level(expression) {
        let part = part.trim();
        if !part.is_empty() {
            values.extend(expand_one(part)?);
        }
    }
    Ok(values)
}

fn split_top_level(expression: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, ch) in expression.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&expression[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&expression[start..]);
    parts
}

fn expand_one(expression: &str) -> Result<Vec<String>, ShardingError> {
    let mut results = vec![String::new()];
    let mut last = 0;
    for caps in PLACEHOLDER_REGEX.captures_iter(expression) {
        let Some(whole) = caps.get(0) else { continue };
        let literal = &expression[last..whole.start()];
        let choices = placeholder_values(expression, &caps[1])?;

        results = results
            .iter()
            .flat_map(|prefix| {
                choices
                    .iter()
                    .map(move |choice| format!("{prefix}{literal}{choice}"))
            })
            .collect();
        last = whole.end();
    }
    let tail = &expression[last..];
    if tail.contains("${") || tail.contains("$->{") {
        return Err(ShardingError::invalid_expression(expression, "unclosed placeholder"));
    }
    for value in &mut results {
        value.push_str(tail);
    }
    Ok(results)
}

fn placeholder_values(expression: &str, body: &str) -> Result<Vec<String>, ShardingError> {
    let body = body.trim();
    if let Some((from, to)) = body.split_once("..") {
        let parse = |s: &str| {
            s.trim().parse::<i64>().map_err(|_| {
                ShardingError::invalid_expression(expression, format!("bad range bound '{}'", s.trim()))
            })
        };
        let (from, to) = (parse(from)?, parse(to)?);
        if from > to {
            return Err(ShardingError::invalid_expression(
                expression,
                format!("empty range {from}..{to}"),
            ));
        }
        return Ok((from..=to).map(|n| n.to_string()).collect());
    }

    let list = body
        .strip_prefix('[')
        .and_then(|b| b.strip_suffix(']'))
        .unwrap_or(body);
    let values: Vec<String> = list
        .split(',')
        .map(|v| v.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return Err(ShardingError::invalid_expression(expression, "empty placeholder"));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_ranges() {
        assert_eq!(
            expand("ds_${0..1}.t_order_${0..1}").unwrap(),
            vec!["ds_0.t_order_0", "ds_0.t_order_1", "ds_1.t_order_0", "ds_1.t_order_1"]
        );
    }

    #[test]
    fn test_expand_lists_and_alias() {
        assert_eq!(
            expand("ds_$->{['a', 'b']}.t").unwrap(),
            vec!["ds_a.t", "ds_b.t"]
        );
    }

    #[test]
    fn test_expand_top_level_commas() {
        assert_eq!(
            expand("ds_0.t_${[0, 1]}, ds_1.t_9").unwrap(),
            vec!["ds_0.t_0", "ds_0.t_1", "ds_1.t_9"]
        );
    }

    #[test]
    fn test_plain_values_pass_through() {
        assert_eq!(expand("ds_0,ds_1").unwrap(), vec!["ds_0", "ds_1"]);
        assert!(expand("").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_expressions() {
        assert!(expand("ds_${1..0}").is_err());
        assert!(expand("ds_${a..b}").is_err());
        assert!(expand("ds_${0..1").is_err());
    }
}
