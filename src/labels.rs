use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::token::FUNCTION_NAMES;

/// Detector class names that differ from the token they stand for.
static DEFAULT_LABELS: Lazy<HashMap<String, String>> = Lazy::new(|| {
    let mut map: HashMap<String, String> = (0..=9)
        .map(|d| (format!("digit_{d}"), d.to_string()))
        .collect();
    for (label, token) in [
        ("plus", "+"),
        ("minus", "-"),
        ("times", "*"),
        ("divide", "/"),
        ("power", "^"),
        ("lparen", "("),
        ("rparen", ")"),
        ("comma", ","),
        ("dot", "."),
        ("bar", "|"),
        ("root", "√"),
        ("pi", "π"),
        ("limit", "lim"),
        ("×", "*"),
        ("÷", "/"),
        ("−", "-"),
    ] {
        map.insert(label.to_string(), token.to_string());
    }
    for c in 'a'..='z' {
        map.insert(format!("var_{c}"), c.to_string());
    }
    map
});

/// Maps raw detector class labels to normalized tokens.
#[derive(Clone, Debug)]
pub struct LabelMap {
    map: HashMap<String, String>,
}

impl Default for LabelMap {
    fn default() -> Self {
        Self {
            map: DEFAULT_LABELS.clone(),
        }
    }
}

impl LabelMap {
    /// Adds or overrides a label mapping, e.g. for a retrained model.
    pub fn insert(&mut self, label: impl Into<String>, token: impl Into<String>) {
        self.map.insert(label.into(), token.into());
    }

    /// Returns `None` for labels that are neither mapped nor already a token.
    pub fn to_token(&self, label: &str) -> Option<String> {
        if let Some(token) = self.map.get(label) {
            return Some(token.clone());
        }
        is_token_like(label).then(|| label.to_string())
    }
}

fn is_token_like(label: &str) -> bool {
    if label.is_empty() {
        return false;
    }
    if label.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    if label == "lim" || FUNCTION_NAMES.contains(&label) {
        return true;
    }
    let mut chars = label.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => {
            c.is_ascii_lowercase() || "+-*/^(),.|√πℯ".contains(c)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_model_labels() {
        let labels = LabelMap::default();
        assert_eq!(labels.to_token("digit_7").as_deref(), Some("7"));
        assert_eq!(labels.to_token("plus").as_deref(), Some("+"));
        assert_eq!(labels.to_token("rparen").as_deref(), Some(")"));
        assert_eq!(labels.to_token("var_x").as_deref(), Some("x"));
        assert_eq!(labels.to_token("×").as_deref(), Some("*"));
    }

    #[test]
    fn passes_through_token_like_labels() {
        let labels = LabelMap::default();
        for label in ["+", "42", "sin", "sqrt", "x", "√", "|", "lim"] {
            assert_eq!(labels.to_token(label).as_deref(), Some(label), "{label}");
        }
    }

    #[test]
    fn rejects_unknown_labels() {
        let labels = LabelMap::default();
        assert_eq!(labels.to_token("frac_bar"), None);
        assert_eq!(labels.to_token("X"), None);
        assert_eq!(labels.to_token(""), None);
    }

    #[test]
    fn custom_mapping_overrides() {
        let mut labels = LabelMap::default();
        labels.insert("frac_bar", "/");
        assert_eq!(labels.to_token("frac_bar").as_deref(), Some("/"));
    }
}
