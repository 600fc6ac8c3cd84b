use super::dom::NodeId;

/// Read access a selector needs to test one element.
pub trait ElementView {
    fn tag_name(&self, node: NodeId) -> Option<&str>;
    fn attribute_value(&self, node: NodeId, name: &str) -> Option<&str>;
    fn parent_node(&self, node: NodeId) -> Option<NodeId>;
}

/// The small subset of CSS selectors the moderation pipeline relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Tag(String),
    Id(String),
    Class(String),
    HasAttribute(String),
    AttributeEquals(String, String),
    /// Every selector matches the same element (`button.send[aria-label]`).
    All(Vec<Selector>),
    /// At least one selector matches (`a, b`).
    Any(Vec<Selector>),
    /// `target` matches and some proper ancestor matches `ancestor` (`footer div`).
    Within {
        ancestor: Box<Selector>,
        target: Box<Selector>,
    },
}

impl Selector {
    pub fn tag(name: &str) -> Self {
        Selector::Tag(name.to_ascii_lowercase())
    }

    pub fn id(id: &str) -> Self {
        Selector::Id(id.to_string())
    }

    pub fn class(name: &str) -> Self {
        Selector::Class(name.to_string())
    }

    pub fn attribute(name: &str) -> Self {
        Selector::HasAttribute(name.to_string())
    }

    pub fn attribute_eq(name: &str, value: &str) -> Self {
        Selector::AttributeEquals(name.to_string(), value.to_string())
    }

    pub fn and(self, other: Selector) -> Self {
        match self {
            Selector::All(mut parts) => {
                parts.push(other);
                Selector::All(parts)
            }
            first => Selector::All(vec![first, other]),
        }
    }

    pub fn or(self, other: Selector) -> Self {
        match self {
            Selector::Any(mut parts) => {
                parts.push(other);
                Selector::Any(parts)
            }
            first => Selector::Any(vec![first, other]),
        }
    }

    pub fn within(self, ancestor: Selector) -> Self {
        Selector::Within {
            ancestor: Box::new(ancestor),
            target: Box::new(self),
        }
    }

    pub fn matches<V: ElementView + ?Sized>(&self, view: &V, node: NodeId) -> bool {
        let Some(tag) = view.tag_name(node) else {
            return false;
        };
        match self {
            Selector::Tag(name) => tag.eq_ignore_ascii_case(name),
            Selector::Id(id) => view.attribute_value(node, "id") == Some(id.as_str()),
            Selector::Class(name) => view
                .attribute_value(node, "class")
                .map(|classes| classes.split_whitespace().any(|c| c == name))
                .unwrap_or(false),
            Selector::HasAttribute(name) => view.attribute_value(node, name).is_some(),
            Selector::AttributeEquals(name, value) => {
                view.attribute_value(node, name) == Some(value.as_str())
            }
            Selector::All(parts) => parts.iter().all(|part| part.matches(view, node)),
            Selector::Any(parts) => parts.iter().any(|part| part.matches(view, node)),
            Selector::Within { ancestor, target } => {
                if !target.matches(view, node) {
                    return false;
                }
                let mut current = view.parent_node(node);
                while let Some(candidate) = current {
                    if ancestor.matches(view, candidate) {
                        return true;
                    }
                    current = view.parent_node(candidate);
                }
                false
            }
        }
    }
}
