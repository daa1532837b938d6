//! Declarative YAML scenarios

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sightline_common::{Cookie, Precondition};

use crate::actions::ScrollOptions;
use crate::error::{E2eError, E2eResult};
use crate::fallback::DragTarget;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_.-]+)\}").expect("valid regex"));

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario, used as the test title
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// Source file; filled in by [`Scenario::from_file`] when absent
    #[serde(default)]
    pub file: String,

    /// Free-form test case guide prepended to every model prompt
    #[serde(default)]
    pub guide: String,

    #[serde(default)]
    pub login_notes: String,

    /// Initial values for `${name}` placeholders
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Extra attempts after a failing one
    #[serde(default)]
    pub retries: u32,

    pub steps: Vec<ScenarioStep>,
}

/// Run the deterministic path only when `variable` currently equals `equals`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct When {
    pub variable: String,
    pub equals: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub x: f64,
    pub y: f64,
}

fn default_true() -> bool {
    true
}

/// A single step in a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    Navigate {
        url: String,
        #[serde(default)]
        description: Option<String>,
    },

    Refresh {
        #[serde(default)]
        description: Option<String>,
    },

    Click {
        description: String,
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        when: Option<When>,
    },

    DoubleClick {
        description: String,
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        when: Option<When>,
    },

    Hover {
        description: String,
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        when: Option<When>,
    },

    Fill {
        description: String,
        value: String,
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        when: Option<When>,
    },

    /// Drag to `target`, by `offset`, or by the default offset
    Drag {
        description: String,
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        offset: Option<Offset>,
        #[serde(default)]
        when: Option<When>,
    },

    Scroll {
        description: String,
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        scroll: ScrollOptions,
        #[serde(default)]
        when: Option<When>,
    },

    /// Press symbolic keys such as `[CTRL, ENTER]`
    Press {
        description: String,
        keys: Vec<String>,
        #[serde(default)]
        selector: Option<String>,
        #[serde(default = "default_true")]
        focus_first: bool,
        #[serde(default)]
        when: Option<When>,
    },

    Cookie {
        cookies: Vec<Cookie>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        when: Option<When>,
    },

    Upload {
        description: String,
        files: Vec<PathBuf>,
        #[serde(default)]
        selector: Option<String>,
    },

    /// Store an extracted value under `variable`
    Extract { variable: String, guide: String },

    /// Strict assertion; a false verdict fails the scenario
    Assert { condition: String },

    /// Non-strict assertion; the verdict is only logged
    Check { condition: String },

    WaitUntil { condition: String },

    PassEarly {
        #[serde(default)]
        message: Option<String>,
    },
}

impl ScenarioStep {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ScenarioStep::Navigate { .. } => "navigate",
            ScenarioStep::Refresh { .. } => "refresh",
            ScenarioStep::Click { .. } => "click",
            ScenarioStep::DoubleClick { .. } => "double_click",
            ScenarioStep::Hover { .. } => "hover",
            ScenarioStep::Fill { .. } => "fill",
            ScenarioStep::Drag { .. } => "drag",
            ScenarioStep::Scroll { .. } => "scroll",
            ScenarioStep::Press { .. } => "press",
            ScenarioStep::Cookie { .. } => "cookie",
            ScenarioStep::Upload { .. } => "upload",
            ScenarioStep::Extract { .. } => "extract",
            ScenarioStep::Assert { .. } => "assert",
            ScenarioStep::Check { .. } => "check",
            ScenarioStep::WaitUntil { .. } => "wait_until",
            ScenarioStep::PassEarly { .. } => "pass_early",
        }
    }
}

/// Resolve a drag step's destination.
pub fn drag_target(target: Option<&str>, offset: Option<Offset>) -> DragTarget {
    match (target, offset) {
        (Some(selector), _) => DragTarget::Selector(selector.to_string()),
        (None, Some(Offset { x, y })) => DragTarget::Offset { x, y },
        (None, None) => DragTarget::Default,
    }
}

/// Replace `${name}` placeholders. Unknown names are left as written.
pub fn interpolate(text: &str, vars: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| {
            vars.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

impl When {
    /// Bind to the current variable values. A variable that has no value yet
    /// leaves the gate open.
    pub fn resolve(&self, vars: &BTreeMap<String, String>) -> Precondition {
        Precondition::new(
            vars.get(&self.variable).cloned().unwrap_or_default(),
            interpolate(&self.equals, vars),
        )
    }
}

impl Scenario {
    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Scenario = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut scenario = Self::from_yaml(&content)?;
        if scenario.file.is_empty() {
            scenario.file = path.display().to_string();
        }
        Ok(scenario)
    }

    /// Load every `.yaml`/`.yml` scenario under a directory, sorted by path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("scenario name must not be empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("scenario '{}' has no steps", self.name)));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if let ScenarioStep::Press { keys, .. } = step {
                if keys.is_empty() {
                    return Err(E2eError::SpecParse(format!(
                        "step {} of '{}': press needs at least one key",
                        i + 1,
                        self.name
                    )));
                }
            }
            if let ScenarioStep::Cookie { cookies, .. } = step {
                if cookies.is_empty() {
                    return Err(E2eError::SpecParse(format!(
                        "step {} of '{}': cookie needs at least one cookie",
                        i + 1,
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{NamedAmount, ScrollAmount, ScrollDirection};

    #[test]
    fn test_parse_checkout_scenario() {
        let yaml = r#"
name: checkout
description: Buy a hat
tags: [shop, smoke]
guide: Add a hat to the cart and pay
variables:
  plan: free
retries: 1
steps:
  - action: navigate
    url: https://shop.test/
  - action: click
    description: Open the hats category
    selector: 'a[href="/hats"]'
  - action: fill
    description: Enter the coupon
    selector: '#coupon'
    value: SAVE10
    when: { variable: plan, equals: free }
  - action: scroll
    description: Scroll to the footer
    scroll: { direction: down, amount: large }
  - action: press
    description: Submit with keyboard
    keys: [CTRL, ENTER]
  - action: extract
    variable: total
    guide: The order total shown in the summary
  - action: assert
    condition: The order total is ${total}
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.name, "checkout");
        assert_eq!(scenario.retries, 1);
        assert_eq!(scenario.steps.len(), 7);

        match &scenario.steps[2] {
            ScenarioStep::Fill { when: Some(when), value, .. } => {
                assert_eq!(when.variable, "plan");
                assert_eq!(value, "SAVE10");
            }
            other => panic!("unexpected step {:?}", other),
        }
        match &scenario.steps[3] {
            ScenarioStep::Scroll { scroll, .. } => {
                assert_eq!(scroll.direction, Some(ScrollDirection::Down));
                assert_eq!(scroll.amount, Some(ScrollAmount::Named(NamedAmount::Large)));
            }
            other => panic!("unexpected step {:?}", other),
        }
        match &scenario.steps[4] {
            ScenarioStep::Press { focus_first, keys, .. } => {
                assert!(*focus_first);
                assert_eq!(keys.len(), 2);
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(scenario.steps[6].kind(), "assert");
    }

    #[test]
    fn test_rejects_empty_scenarios() {
        assert!(matches!(
            Scenario::from_yaml("name: empty\nsteps: []\n"),
            Err(E2eError::SpecParse(_))
        ));
        assert!(matches!(
            Scenario::from_yaml("name: ''\nsteps:\n  - action: refresh\n"),
            Err(E2eError::SpecParse(_))
        ));
        assert!(matches!(
            Scenario::from_yaml("name: keys\nsteps:\n  - action: press\n    description: nothing\n    keys: []\n"),
            Err(E2eError::SpecParse(_))
        ));
        assert!(matches!(
            Scenario::from_yaml("name: bad\nsteps:\n  - action: teleport\n"),
            Err(E2eError::Yaml(_))
        ));
    }

    #[test]
    fn test_interpolation() {
        let mut vars = BTreeMap::new();
        vars.insert("total".to_string(), "42".to_string());
        assert_eq!(interpolate("Total is ${total}", &vars), "Total is 42");
        assert_eq!(interpolate("Keep ${missing}", &vars), "Keep ${missing}");
        assert_eq!(interpolate("$total", &vars), "$total");
    }

    #[test]
    fn test_when_resolution() {
        let mut vars = BTreeMap::new();
        vars.insert("plan".to_string(), "pro".to_string());

        let when = When { variable: "plan".into(), equals: "free".into() };
        assert!(!when.resolve(&vars).holds());

        let unset = When { variable: "region".into(), equals: "eu".into() };
        assert!(unset.resolve(&vars).holds());
    }

    #[test]
    fn test_drag_target_resolution() {
        assert_eq!(drag_target(Some("#bin"), None), DragTarget::Selector("#bin".into()));
        assert_eq!(
            drag_target(None, Some(Offset { x: 5.0, y: -3.0 })),
            DragTarget::Offset { x: 5.0, y: -3.0 }
        );
        assert_eq!(drag_target(None, None), DragTarget::Default);
    }

    #[test]
    fn test_load_all_sets_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.yaml"),
            "name: second\nsteps:\n  - action: refresh\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.yml"),
            "name: first\ntags: [smoke]\nsteps:\n  - action: refresh\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let scenarios = Scenario::load_all(dir.path()).unwrap();
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].name, "first");
        assert!(scenarios[0].file.ends_with("a.yml"));
        assert_eq!(Scenario::filter_by_tag(&scenarios, "smoke").len(), 1);
    }
}
