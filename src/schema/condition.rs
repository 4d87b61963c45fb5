//! 条件：ConditionalAsk 与 ValueCheck 的判定规则
//!
//! 条件针对「所属帧已填写的值」求值，键为属性名（嵌套帧为 `a.b`）。

use std::collections::BTreeMap;

use super::Registry;

/// 帧内已填写的值（属性 -> 值）
pub type SlotValues = BTreeMap<String, String>;

/// 封闭的条件集合；Named 在注册表中查找具名谓词
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Always,
    Filled(String),
    Equals(String, String),
    Not(Box<Condition>),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Named(String),
}

impl Condition {
    pub fn filled(attribute: impl Into<String>) -> Self {
        Condition::Filled(attribute.into())
    }

    pub fn equals(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Condition::Equals(attribute.into(), value.into())
    }

    pub fn named(key: impl Into<String>) -> Self {
        Condition::Named(key.into())
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// 未注册的具名谓词按 false 处理并记录警告
    pub fn eval(&self, values: &SlotValues, registry: &Registry) -> bool {
        match self {
            Condition::Always => true,
            Condition::Filled(attr) => values.contains_key(attr),
            Condition::Equals(attr, v) => values.get(attr).is_some_and(|x| x == v),
            Condition::Not(c) => !c.eval(values, registry),
            Condition::All(cs) => cs.iter().all(|c| c.eval(values, registry)),
            Condition::Any(cs) => cs.iter().any(|c| c.eval(values, registry)),
            Condition::Named(key) => match registry.predicate(key) {
                Some(p) => p(values),
                None => {
                    tracing::warn!("Unknown predicate '{}', treated as false", key);
                    false
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> SlotValues {
        let mut v = SlotValues::new();
        v.insert("city".to_string(), "Paris".to_string());
        v.insert("nights".to_string(), "3".to_string());
        v
    }

    #[test]
    fn test_basic_conditions() {
        let reg = Registry::new();
        let v = values();
        assert!(Condition::filled("city").eval(&v, &reg));
        assert!(!Condition::filled("hotel").eval(&v, &reg));
        assert!(Condition::equals("city", "Paris").eval(&v, &reg));
        assert!(Condition::equals("city", "Rome").negate().eval(&v, &reg));
        assert!(Condition::Any(vec![Condition::filled("x"), Condition::filled("nights")]).eval(&v, &reg));
        assert!(!Condition::All(vec![Condition::filled("x"), Condition::filled("nights")]).eval(&v, &reg));
    }

    #[test]
    fn test_named_predicate() {
        let mut reg = Registry::new();
        reg.register_predicate("short_stay", |v: &SlotValues| {
            v.get("nights").and_then(|n| n.parse::<u32>().ok()).is_some_and(|n| n < 5)
        });
        assert!(Condition::named("short_stay").eval(&values(), &reg));
        assert!(!Condition::named("missing").eval(&values(), &reg));
    }
}
