//! 提问话术与模板

use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::DialogAct;
use crate::core::DialogError;
use crate::engine::{dangling, Dialog};
use crate::event::split_qualified;
use crate::filler::{DecisionPurpose, FillerId, FillerKind};
use crate::schema::{AskStrategy, SlotValues};

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

/// 替换 `{key}` 占位符：`{value}` 取槽位自身的值，其余按帧内已填写的值；
/// 没有值的占位符（跳过、「都行」、尚未填写）渲染为空串
pub fn render(template: &str, values: &SlotValues, value: Option<&str>) -> String {
    let re = PLACEHOLDER_RE.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_.]+)\}").unwrap());
    re.replace_all(template, |caps: &Captures| {
        let key = &caps[1];
        match (key, value) {
            ("value", Some(v)) => v.to_string(),
            _ => values.get(key).cloned().unwrap_or_default(),
        }
    })
    .into_owned()
}

impl<'a> Dialog<'a> {
    /// 节点所属帧的已填写值
    pub(crate) fn owner_values(&self, id: FillerId) -> Result<SlotValues, DialogError> {
        match self.session.arena.owning_frame(id) {
            Some(frame) => self.frame_values(frame),
            None => Ok(SlotValues::new()),
        }
    }

    /// 栈顶节点需要的提问
    pub(crate) fn ask_act(&mut self, id: FillerId) -> Result<DialogAct, DialogError> {
        let node = self.node(id)?;
        let attribute = node.attribute.clone();
        let parent = node.parent;
        let values = self.owner_values(id)?;
        match node.kind.clone() {
            FillerKind::Entity(_) => {
                let prompt = match parent.and_then(|p| self.session.arena.get(p)).map(|n| &n.kind) {
                    Some(FillerKind::Interface(i)) => {
                        let spec = self.registry().frame(&i.interface_type);
                        match spec.and_then(|s| s.type_prompt.clone()) {
                            Some(p) => p,
                            None => {
                                let options: Vec<&str> = spec
                                    .map(|s| s.variants().iter().map(|v| split_qualified(v).1).collect())
                                    .unwrap_or_default();
                                format!("Which one: {}?", options.join(", "))
                            }
                        }
                    }
                    _ => {
                        let wrapper = self.session.arena.parent_wrapper(id).ok_or_else(|| dangling(id))?;
                        match self.slot_spec(wrapper)?.and_then(|s| s.prompt.as_ref()) {
                            Some(p) => p.clone(),
                            None => format!("What is the {attribute}?"),
                        }
                    }
                };
                Ok(DialogAct::Ask {
                    slot: attribute,
                    prompt: render(&prompt, &values, None),
                })
            }
            FillerKind::Decision(d) => {
                let owner = parent.ok_or_else(|| dangling(id))?;
                match d.purpose {
                    DecisionPurpose::Gate => {
                        let prompt = match self.slot_spec(owner)?.map(|s| &s.ask) {
                            Some(AskStrategy::BoolGate { prompt }) => prompt.clone(),
                            _ => format!("Do you want to give the {attribute}?"),
                        };
                        Ok(DialogAct::Ask {
                            slot: attribute,
                            prompt: render(&prompt, &values, None),
                        })
                    }
                    DecisionPurpose::Confirm => {
                        let value = self.wrapper_entity_value(owner)?;
                        let prompt = match self.slot_spec(owner)?.and_then(|s| s.confirm.as_ref()) {
                            Some(c) => c.prompt.clone(),
                            None => "Is {value} correct?".to_string(),
                        };
                        Ok(DialogAct::Confirm {
                            slot: attribute,
                            prompt: render(&prompt, &values, value.as_deref()),
                        })
                    }
                    DecisionPurpose::HasMore => {
                        let list_wrapper = self.node(owner)?.parent.ok_or_else(|| dangling(owner))?;
                        let prompt = match self.slot_spec(list_wrapper)?.and_then(|s| s.has_more_prompt.as_ref()) {
                            Some(p) => p.clone(),
                            None => self.settings().default_has_more_prompt.clone(),
                        };
                        let mut values = values;
                        values.entry("attribute".to_string()).or_insert_with(|| attribute.clone());
                        Ok(DialogAct::Ask {
                            slot: attribute,
                            prompt: render(&prompt, &values, None),
                        })
                    }
                }
            }
            FillerKind::Recommend(_) => {
                let wrapper = parent.ok_or_else(|| dangling(id))?;
                let prompt = self
                    .policy(wrapper)?
                    .recommend
                    .map(|r| r.prompt.clone())
                    .unwrap_or_else(|| format!("Which {attribute} would you like?"));
                let (candidates, page) = self.recommend_page(id)?;
                Ok(DialogAct::Offer {
                    slot: attribute,
                    prompt: render(&prompt, &values, None),
                    candidates,
                    page,
                })
            }
            other => Err(DialogError::InvariantViolation(format!(
                "cannot ask for a {} node {id}",
                other.label()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_placeholders() {
        let mut values = SlotValues::new();
        values.insert("person.name".to_string(), "Joe".to_string());
        assert_eq!(render("Hi {person.name}!", &values, None), "Hi Joe!");
        assert_eq!(render("Is {value} right?", &values, Some("3")), "Is 3 right?");
        assert_eq!(render("meal {person.name}{note}!", &values, None), "meal Joe!");
        assert_eq!(render("{value} or nothing", &values, None), " or nothing");
    }
}
