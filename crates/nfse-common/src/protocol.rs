use serde::{Deserialize, Serialize};

/// Elements enumerated for free-text matching when a target has no scope.
pub const DEFAULT_TEXT_SCOPE: &str = "button, a, input[type='submit'], input[type='button'], [role='button'], span, label";

/// Opaque reference to an element held by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorKind {
    Css,
    #[serde(rename = "xpath")]
    XPath,
}

impl std::fmt::Display for LocatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocatorKind::Css => write!(f, "css"),
            LocatorKind::XPath => write!(f, "xpath"),
        }
    }
}

/// A single (kind, expression) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub kind: LocatorKind,
    pub value: String,
}

impl Selector {
    pub fn css(value: impl Into<String>) -> Self {
        Self {
            kind: LocatorKind::Css,
            value: value.into(),
        }
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self {
            kind: LocatorKind::XPath,
            value: value.into(),
        }
    }
}

/// Ordered selectors tried in sequence for one logical field.
pub type SelectorStrategy = Vec<Selector>;

/// Declarative description of a logical page field.
///
/// CSS selectors are tried first, then XPath expressions, then a free-text
/// search over `text_scope`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSpec {
    pub css: Vec<String>,
    pub xpath: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_scope: Option<String>,
}

impl TargetSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn css(mut self, selector: impl Into<String>) -> Self {
        self.css.push(selector.into());
        self
    }

    pub fn xpath(mut self, expr: impl Into<String>) -> Self {
        self.xpath.push(expr.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn exact_text(mut self, text: impl Into<String>) -> Self {
        self.exact_text = Some(text.into());
        self
    }

    pub fn text_scope(mut self, scope: impl Into<String>) -> Self {
        self.text_scope = Some(scope.into());
        self
    }

    /// CSS then XPath selectors, in priority order.
    pub fn selectors(&self) -> SelectorStrategy {
        self.css
            .iter()
            .map(Selector::css)
            .chain(self.xpath.iter().map(Selector::xpath))
            .collect()
    }

    /// Copy with every `{key}` placeholder replaced by `value`.
    pub fn substitute(&self, key: &str, value: &str) -> TargetSpec {
        let placeholder = format!("{{{}}}", key);
        let fill = |s: &String| s.replace(&placeholder, value);
        TargetSpec {
            css: self.css.iter().map(fill).collect(),
            xpath: self.xpath.iter().map(fill).collect(),
            text: self.text.as_ref().map(fill),
            exact_text: self.exact_text.as_ref().map(fill),
            text_scope: self.text_scope.clone(),
        }
    }

    pub fn scope(&self) -> &str {
        self.text_scope.as_deref().unwrap_or(DEFAULT_TEXT_SCOPE)
    }

    pub fn is_empty(&self) -> bool {
        self.css.is_empty() && self.xpath.is_empty() && self.text.is_none()
    }

    /// Short human-readable label for logs and diagnostic file names.
    pub fn describe(&self) -> String {
        if let Some(text) = self.exact_text.as_ref().or(self.text.as_ref()) {
            format!("text:{}", text)
        } else if let Some(css) = self.css.first() {
            format!("css:{}", css)
        } else if let Some(xpath) = self.xpath.first() {
            format!("xpath:{}", xpath)
        } else {
            "<empty>".to_string()
        }
    }
}

/// Ways to deliver a click, in the order the locator tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickMethod {
    Native,
    Scripted,
    SyntheticEvent,
    FormSubmit,
}

impl ClickMethod {
    pub const ALL: [ClickMethod; 4] = [
        ClickMethod::Native,
        ClickMethod::Scripted,
        ClickMethod::SyntheticEvent,
        ClickMethod::FormSubmit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ClickMethod::Native => "native",
            ClickMethod::Scripted => "scripted",
            ClickMethod::SyntheticEvent => "synthetic_event",
            ClickMethod::FormSubmit => "form_submit",
        }
    }
}

/// Key pressed after filling a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitKey {
    Enter,
    Tab,
}

impl SubmitKey {
    /// WebDriver key code point.
    pub fn code_point(&self) -> char {
        match self {
            SubmitKey::Enter => '\u{E007}',
            SubmitKey::Tab => '\u{E004}',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorAction {
    Click,
    Fill {
        text: String,
        submit: Option<SubmitKey>,
    },
}

impl LocatorAction {
    pub fn fill(text: impl Into<String>) -> Self {
        LocatorAction::Fill {
            text: text.into(),
            submit: None,
        }
    }

    pub fn fill_and(text: impl Into<String>, key: SubmitKey) -> Self {
        LocatorAction::Fill {
            text: text.into(),
            submit: Some(key),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LocatorAction::Click => "click",
            LocatorAction::Fill { .. } => "fill",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors_order_css_then_xpath() {
        let target = TargetSpec::new()
            .xpath("//button")
            .css("#a")
            .css(".b");
        let kinds: Vec<_> = target.selectors().into_iter().map(|s| (s.kind, s.value)).collect();
        assert_eq!(
            kinds,
            vec![
                (LocatorKind::Css, "#a".to_string()),
                (LocatorKind::Css, ".b".to_string()),
                (LocatorKind::XPath, "//button".to_string()),
            ]
        );
    }

    #[test]
    fn test_target_from_yaml() {
        let yaml = r##"
css: ["#btnEmitir"]
text: "Emitir"
"##;
        let target: TargetSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(target.css, vec!["#btnEmitir"]);
        assert!(target.xpath.is_empty());
        assert_eq!(target.scope(), DEFAULT_TEXT_SCOPE);
        assert_eq!(target.describe(), "text:Emitir");
    }

    #[test]
    fn test_substitute_placeholders() {
        let target = TargetSpec::new()
            .css("option[value='{code}']")
            .xpath("//option[contains(., '{code}')]")
            .text("{code}");
        let filled = target.substitute("code", "1701");
        assert_eq!(filled.css, vec!["option[value='1701']"]);
        assert_eq!(filled.xpath, vec!["//option[contains(., '1701')]"]);
        assert_eq!(filled.text.as_deref(), Some("1701"));
    }

    #[test]
    fn test_click_method_order() {
        assert_eq!(ClickMethod::ALL[0], ClickMethod::Native);
        assert_eq!(ClickMethod::ALL[3], ClickMethod::FormSubmit);
    }
}
