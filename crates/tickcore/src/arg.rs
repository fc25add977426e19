use crate::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named argument bound to an operator or condition at construction time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub name: String,
    pub value: Value,
}

impl Arg {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn has_value(&self) -> bool {
        !self.value.is_null()
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name: {}\ntype: {}", self.name, self.value.type_name())
    }
}

/// Ordered list of arguments; later entries win when names repeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgList {
    pub name: String,
    args: Vec<Arg>,
}

impl ArgList {
    pub fn new() -> Self {
        Self {
            name: "arglist".to_string(),
            args: Vec::new(),
        }
    }

    pub fn add(&mut self, arg: Arg) {
        self.args.push(arg);
    }

    /// Append every argument of another list
    pub fn extend(&mut self, other: &ArgList) {
        self.args.extend(other.args.iter().cloned());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add(Arg::new(name, value));
        self
    }

    pub fn clear(&mut self) {
        self.args.clear();
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Last value bound under `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args
            .iter()
            .rev()
            .find(|arg| arg.name == name)
            .map(|arg| &arg.value)
    }
}

impl Default for ArgList {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Arg> for ArgList {
    fn from(arg: Arg) -> Self {
        let mut list = ArgList::new();
        list.add(arg);
        list
    }
}

impl FromIterator<Arg> for ArgList {
    fn from_iter<I: IntoIterator<Item = Arg>>(iter: I) -> Self {
        let mut list = ArgList::new();
        for arg in iter {
            list.add(arg);
        }
        list
    }
}
