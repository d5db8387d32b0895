//! ABI-relevant facts extracted from one compiled class.

use std::collections::BTreeMap;

use kindle_common::ContentHash;
use serde::{Deserialize, Serialize};

/// Declared visibility of a member.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Visibility {
    /// Visible everywhere.
    Public,
    /// Visible to subclasses.
    Protected,
    /// Visible inside the module.
    Internal,
    /// Visible only inside the declaring class or file.
    Private,
}

impl Visibility {
    /// Private members cannot be referenced from other files.
    pub fn is_private(self) -> bool {
        self == Visibility::Private
    }
}

/// The signature of one declared member.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct MemberSignature {
    /// Simple member name. Overloads share a name.
    pub name: String,
    /// Declared visibility.
    pub visibility: Visibility,
    /// Hash of the member's full signature.
    pub signature: ContentHash,
}

/// Summary of a compiled class as read from the compiler's output metadata.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClassSummary {
    /// Fully qualified class name; also the lookup scope of its members.
    pub name: String,
    /// Declared members.
    pub members: Vec<MemberSignature>,
    /// Inline function name -> hash of its emitted body.
    pub inline_functions: BTreeMap<String, ContentHash>,
    /// Constant property name -> hash of its value.
    pub constants: BTreeMap<String, ContentHash>,
}

impl ClassSummary {
    /// Creates a summary with no members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a member signature.
    pub fn member(mut self, name: &str, visibility: Visibility, signature: &str) -> Self {
        self.members.push(MemberSignature {
            name: name.to_string(),
            visibility,
            signature: ContentHash::from_bytes(signature.as_bytes()),
        });
        self
    }

    /// Adds an inline function with the given emitted body.
    pub fn inline_function(mut self, name: &str, body: &str) -> Self {
        self.inline_functions
            .insert(name.to_string(), ContentHash::from_bytes(body.as_bytes()));
        self
    }

    /// Adds a constant with the given value.
    pub fn constant(mut self, name: &str, value: &str) -> Self {
        self.constants
            .insert(name.to_string(), ContentHash::from_bytes(value.as_bytes()));
        self
    }

    /// Non-private members keyed by name, overloads folded into one hash.
    pub fn visible_members(&self) -> BTreeMap<String, ContentHash> {
        let mut grouped: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for member in self.members.iter().filter(|m| !m.visibility.is_private()) {
            grouped
                .entry(member.name.as_str())
                .or_default()
                .push(format!("{:?}:{}", member.visibility, member.signature));
        }
        grouped
            .into_iter()
            .map(|(name, mut sigs)| {
                sigs.sort();
                (name.to_string(), ContentHash::from_parts(sigs))
            })
            .collect()
    }

    /// Hash over every non-private member signature of the class.
    pub fn signature_hash(&self) -> ContentHash {
        let visible = self.visible_members();
        ContentHash::from_parts(
            visible
                .iter()
                .map(|(name, hash)| format!("{name}={hash}")),
        )
    }
}
