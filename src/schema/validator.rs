//! 实体类型与取值校验

use regex::Regex;

/// 实体取值校验器；返回归一化后的值或拒绝原因
#[derive(Debug, Clone)]
pub enum Validator {
    Any,
    Integer { min: Option<i64>, max: Option<i64> },
    OneOf(Vec<String>),
    Pattern(Regex),
}

impl Validator {
    pub fn integer() -> Self {
        Validator::Integer { min: None, max: None }
    }

    pub fn range(min: i64, max: i64) -> Self {
        Validator::Integer {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn one_of<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Validator::OneOf(items.into_iter().map(Into::into).collect())
    }

    pub fn pattern(re: &str) -> Result<Self, regex::Error> {
        Ok(Validator::Pattern(Regex::new(re)?))
    }

    pub fn validate(&self, raw: &str) -> Result<String, String> {
        let raw = raw.trim();
        match self {
            Validator::Any => Ok(raw.to_string()),
            Validator::Integer { min, max } => {
                let n: i64 = raw
                    .parse()
                    .map_err(|_| format!("'{raw}' is not a number"))?;
                if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                    return Err(format!("{n} is out of range"));
                }
                Ok(n.to_string())
            }
            Validator::OneOf(items) => items
                .iter()
                .find(|i| i.eq_ignore_ascii_case(raw))
                .cloned()
                .ok_or_else(|| format!("'{raw}' is not one of {}", items.join(", "))),
            Validator::Pattern(re) => {
                if re.is_match(raw) {
                    Ok(raw.to_string())
                } else {
                    Err(format!("'{raw}' is not a valid value"))
                }
            }
        }
    }
}

/// 实体类型定义
#[derive(Debug, Clone)]
pub struct EntitySpec {
    pub name: String,
    pub validator: Validator,
}

impl EntitySpec {
    pub fn new(name: impl Into<String>, validator: Validator) -> Self {
        Self {
            name: name.into(),
            validator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_normalizes() {
        assert_eq!(Validator::integer().validate(" 042 ").unwrap(), "42");
        assert!(Validator::range(0, 150).validate("200").is_err());
        assert!(Validator::integer().validate("abc").is_err());
    }

    #[test]
    fn test_one_of_is_case_insensitive() {
        let v = Validator::one_of(["Paris", "Rome"]);
        assert_eq!(v.validate("paris").unwrap(), "Paris");
        assert!(v.validate("Oslo").is_err());
    }

    #[test]
    fn test_pattern() {
        let v = Validator::pattern(r"^\d{4}$").unwrap();
        assert!(v.validate("2024").is_ok());
        assert!(v.validate("24").is_err());
    }
}
