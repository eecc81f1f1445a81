//! Field extraction from semi-structured reply nodes.
//!
//! Weather replies carry each value as `<field data="..."/>` under a block
//! element. Extraction looks up the first descendant with the field's name and
//! reads its `data` attribute. Nothing is validated here; absent fields come
//! back as `None` and it is up to the builder to decide what that means.

use std::collections::BTreeMap;

use roxmltree::Node;

/// Attribute holding a field's value.
pub const DATA_ATTR: &str = "data";

/// Mapping from each requested field name to its value, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields<'k> {
    values: BTreeMap<&'k str, Option<String>>,
}

impl<'k> Fields<'k> {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_deref())
    }

    /// Move a value out, leaving `None` behind.
    pub fn take(&mut self, key: &str) -> Option<String> {
        self.values.get_mut(key).and_then(Option::take)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'k str> + '_ {
        self.values.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Pull `keys` out of `node`. `node` may be absent (block missing from the
/// reply), in which case every key maps to `None`.
pub fn extract_fields<'k>(node: Option<Node<'_, '_>>, keys: &[&'k str]) -> Fields<'k> {
    let values = keys
        .iter()
        .map(|&key| {
            let value = node.and_then(|n| field_value(n, key)).map(str::to_owned);
            (key, value)
        })
        .collect();

    Fields { values }
}

fn field_value<'a>(node: Node<'a, '_>, key: &str) -> Option<&'a str> {
    node.descendants()
        .find(|n| n.is_element() && n.has_tag_name(key))
        .and_then(|n| n.attribute(DATA_ATTR))
}

/// First descendant element of `root` named `name`.
pub fn find_block<'a, 'input>(root: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    root.descendants().find(|n| n.is_element() && n.has_tag_name(name))
}

/// All descendant elements of `root` named `name`, in document order.
pub fn find_blocks<'a, 'input: 'a>(
    root: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    root.descendants().filter(move |n| n.is_element() && n.has_tag_name(name))
}
