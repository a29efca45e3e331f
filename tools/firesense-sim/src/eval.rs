//! One-off expression evaluation

use anyhow::{anyhow, Context, Result};
use firesense_calc::{Expression, StaticContext, Value};

/// Evaluate `expr` with `NAME=LITERAL` bindings
pub fn evaluate(expr: &str, bindings: &[String], millis: u64) -> Result<Value> {
    let mut ctx = StaticContext::new();
    ctx.millis = millis;
    ctx.micros = millis.saturating_mul(1000);

    for binding in bindings {
        let (name, literal) = binding
            .split_once('=')
            .ok_or_else(|| anyhow!("Binding '{}' must look like NAME=VALUE", binding))?;
        let value = Value::from_literal(literal)
            .with_context(|| format!("Invalid value for '{}'", name.trim()))?;
        ctx.set(name.trim(), value);
    }

    let expression = Expression::parse(expr, &ctx);
    Ok(expression.evaluate(&ctx))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use firesense_calc::ValueType;

    #[test]
    fn test_left_to_right_grouping() {
        assert_eq!(evaluate("10 - 2 * 3", &[], 0).unwrap().as_int(), 4);
        assert_eq!(evaluate("(1 + 2) * 3", &[], 0).unwrap().as_int(), 9);
    }

    #[test]
    fn test_bindings() {
        let bindings = vec!["T=21.5".to_string(), "OFFSET = 2".to_string()];
        let value = evaluate("T + OFFSET", &bindings, 0).unwrap();
        assert_eq!(value.value_type(), ValueType::Float);
        assert_eq!(value.to_string(), "23.5");
    }

    #[test]
    fn test_millis_and_unknown_names() {
        assert_eq!(evaluate("millis", &[], 1500).unwrap().as_int(), 1500);
        assert_eq!(evaluate("NOPE + 1", &[], 0).unwrap().as_int(), 1);
    }

    #[test]
    fn test_bad_binding() {
        assert!(evaluate("A", &["A".to_string()], 0).is_err());
        assert!(evaluate("A", &["A=abc".to_string()], 0).is_err());
    }
}
