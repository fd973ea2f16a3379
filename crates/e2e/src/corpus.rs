//! Fixture corpus: declarative YAML case records
//!
//! A corpus is loaded once and never mutated. Scenario workers share it
//! through an `Arc`.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::MAX_RESPONSIVENESS_MS;
use crate::error::{E2eError, E2eResult};
use crate::trigger::InputMode;

const BUILTIN_CORPUS: &str = include_str!("../fixtures/swifttranslator.yaml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    Positive,
    Negative,
    UiBehavior,
}

impl fmt::Display for CaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaseKind::Positive => "positive",
            CaseKind::Negative => "negative",
            CaseKind::UiBehavior => "ui_behavior",
        };
        f.write_str(s)
    }
}

impl FromStr for CaseKind {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "positive" | "pos" => Ok(CaseKind::Positive),
            "negative" | "neg" => Ok(CaseKind::Negative),
            "ui_behavior" | "ui" => Ok(CaseKind::UiBehavior),
            other => Err(E2eError::Corpus(format!("unknown case kind: {}", other))),
        }
    }
}

/// UI-behavior checks, independent of translation correctness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiCheck {
    /// Produce output from `seed`, clear the input, expect the output to
    /// clear too
    ClearsOutput { seed: String },

    /// Output must change from its pre-input baseline within `limit_ms`
    RespondsWithin {
        #[serde(default = "default_responsiveness_limit")]
        limit_ms: u64,
    },

    /// Site opens on the configured URL with a matching title
    SiteIdentity {
        #[serde(default = "default_title_pattern")]
        title_pattern: String,
    },
}

fn default_responsiveness_limit() -> u64 {
    2000
}

fn default_title_pattern() -> String {
    "(?i)translator".to_string()
}

/// One scenario's input and expected canonical output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Unique across the corpus; used as the scenario name in reports
    pub id: String,

    pub kind: CaseKind,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub input: String,

    /// Exact text the normalized SUT output must equal
    #[serde(default)]
    pub expected: String,

    #[serde(default)]
    pub input_mode: InputMode,

    /// Override for the post-fill keystroke workaround
    #[serde(default)]
    pub force_reevaluation: Option<bool>,

    /// Required for `ui_behavior` cases, forbidden otherwise
    #[serde(default)]
    pub check: Option<UiCheck>,
}

impl CaseRecord {
    pub fn new(
        id: impl Into<String>,
        kind: CaseKind,
        input: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            description: String::new(),
            input: input.into(),
            expected: expected.into(),
            input_mode: InputMode::Fill,
            force_reevaluation: None,
            check: None,
        }
    }

    pub fn ui(id: impl Into<String>, input: impl Into<String>, check: UiCheck) -> Self {
        Self {
            check: Some(check),
            ..Self::new(id, CaseKind::UiBehavior, input, "")
        }
    }

    /// Positive cases force re-evaluation after a fill unless overridden.
    pub fn forces_reevaluation(&self) -> bool {
        self.force_reevaluation
            .unwrap_or(self.kind == CaseKind::Positive)
    }
}

#[derive(Debug, Deserialize)]
struct CorpusFile {
    #[serde(default)]
    name: Option<String>,
    cases: Vec<CaseRecord>,
}

/// Which cases to run.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub kinds: Vec<CaseKind>,
    pub ids: Vec<String>,
}

impl Selection {
    fn admits(&self, case: &CaseRecord) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&case.kind))
            && (self.ids.is_empty() || self.ids.iter().any(|id| id == &case.id))
    }
}

/// Ordered, validated collection of case records.
#[derive(Debug, Clone)]
pub struct Corpus {
    name: String,
    cases: Vec<CaseRecord>,
}

impl Corpus {
    pub fn new(name: impl Into<String>, cases: Vec<CaseRecord>) -> E2eResult<Self> {
        let corpus = Self {
            name: name.into(),
            cases,
        };
        corpus.validate()?;
        Ok(corpus)
    }

    /// Cases shipped with the harness.
    pub fn builtin() -> E2eResult<Self> {
        Self::from_yaml(BUILTIN_CORPUS)
    }

    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let file: CorpusFile = serde_yaml::from_str(yaml)?;
        Self::new(file.name.unwrap_or_else(|| "corpus".to_string()), file.cases)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| match e {
            E2eError::Corpus(msg) => E2eError::Corpus(format!("{}: {}", path.display(), msg)),
            other => E2eError::Corpus(format!("{}: {}", path.display(), other)),
        })
    }

    /// Load a single file, or every `.yaml`/`.yml` under a directory in path
    /// order. Ids must be unique across all files.
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.is_dir() {
            Self::load_dir(path)
        } else {
            Self::from_file(path)
        }
    }

    pub fn load_dir(dir: &Path) -> E2eResult<Self> {
        let mut files: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(E2eError::Corpus(format!("no fixture files under {}", dir.display())));
        }

        let mut cases = Vec::new();
        for file in &files {
            cases.extend(Self::from_file(file)?.cases);
        }
        Self::new(dir.display().to_string(), cases)
    }

    fn validate(&self) -> E2eResult<()> {
        let mut seen = HashSet::new();
        for case in &self.cases {
            if case.id.trim().is_empty() {
                return Err(E2eError::Corpus("case with empty id".into()));
            }
            if !seen.insert(case.id.as_str()) {
                return Err(E2eError::Corpus(format!("duplicate case id: {}", case.id)));
            }
            match (case.kind, &case.check) {
                (CaseKind::UiBehavior, None) => {
                    return Err(E2eError::Corpus(format!(
                        "{}: ui_behavior case needs a check",
                        case.id
                    )));
                }
                (CaseKind::Positive | CaseKind::Negative, Some(_)) => {
                    return Err(E2eError::Corpus(format!(
                        "{}: only ui_behavior cases take a check",
                        case.id
                    )));
                }
                (_, Some(UiCheck::RespondsWithin { limit_ms: 0 })) => {
                    return Err(E2eError::Corpus(format!(
                        "{}: limit_ms must be positive",
                        case.id
                    )));
                }
                (_, Some(UiCheck::RespondsWithin { limit_ms }))
                    if *limit_ms > MAX_RESPONSIVENESS_MS =>
                {
                    return Err(E2eError::Corpus(format!(
                        "{}: limit_ms must be at most {} ms, got {}",
                        case.id, MAX_RESPONSIVENESS_MS, limit_ms
                    )));
                }
                (_, Some(UiCheck::SiteIdentity { title_pattern })) => {
                    regex::Regex::new(title_pattern)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cases(&self) -> &[CaseRecord] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CaseRecord> {
        self.cases.iter().find(|c| c.id == id)
    }

    pub fn of_kind(&self, kind: CaseKind) -> impl Iterator<Item = &CaseRecord> {
        self.cases.iter().filter(move |c| c.kind == kind)
    }

    /// Sub-corpus keeping corpus order. Unknown ids are an error so a typo
    /// never turns into an empty, passing run.
    pub fn select(&self, selection: &Selection) -> E2eResult<Self> {
        for id in &selection.ids {
            if self.get(id).is_none() {
                return Err(E2eError::Corpus(format!("case not found: {}", id)));
            }
        }
        Ok(Self {
            name: self.name.clone(),
            cases: self
                .cases
                .iter()
                .filter(|c| selection.admits(c))
                .cloned()
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_corpus() {
        let corpus = Corpus::builtin().unwrap();
        assert_eq!(corpus.name(), "swifttranslator");
        assert_eq!(corpus.of_kind(CaseKind::Positive).count(), 29);
        assert_eq!(corpus.of_kind(CaseKind::Negative).count(), 10);
        assert_eq!(corpus.of_kind(CaseKind::UiBehavior).count(), 3);

        let case = corpus.get("Pos_Fun_0001").unwrap();
        assert_eq!(case.input, "mama kathandhara potha balanava.");
        assert_eq!(case.expected, "මම කතන්දර පොත බලනව.");
        assert!(case.forces_reevaluation());

        let case = corpus.get("Neg_Fun_0007").unwrap();
        assert_eq!(case.expected, "මම ශ්\u{200d}රි ලංකා පුරවසියෙක්.");
        assert!(!case.forces_reevaluation());

        let case = corpus.get("Pos_Fun_0027").unwrap();
        assert_eq!(case.input, "heta apita nivaadu. \nudheema hambemu.");
    }

    #[test]
    fn test_builtin_ui_checks() {
        let corpus = Corpus::builtin().unwrap();
        assert_eq!(
            corpus.get("Pos_UI_0001").unwrap().check,
            Some(UiCheck::ClearsOutput {
                seed: "api heta hambemu.".into()
            })
        );
        assert_eq!(
            corpus.get("Neg_UI_0001").unwrap().check,
            Some(UiCheck::RespondsWithin { limit_ms: 2000 })
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let yaml = r#"
cases:
  - id: Pos_Fun_0001
    kind: positive
    input: api
    expected: අපි
  - id: Pos_Fun_0001
    kind: negative
    input: api
    expected: අපි
"#;
        let err = Corpus::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate case id"));
    }

    #[test]
    fn test_ui_case_requires_check() {
        let yaml = r#"
cases:
  - id: Pos_UI_0002
    kind: ui_behavior
    input: api
"#;
        assert!(Corpus::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_responsiveness_limit_bounded() {
        let yaml = |limit: u64| {
            format!(
                r#"
cases:
  - id: Neg_UI_0002
    kind: ui_behavior
    input: qqqq
    check:
      type: responds_within
      limit_ms: {}
"#,
                limit
            )
        };
        assert!(Corpus::from_yaml(&yaml(2000)).is_ok());

        let err = Corpus::from_yaml(&yaml(3000)).unwrap_err();
        assert!(err.to_string().contains("at most 2000 ms"), "{}", err);
        assert!(Corpus::from_yaml(&yaml(0)).is_err());
    }

    #[test]
    fn test_typed_input_mode_and_override() {
        let yaml = r#"
cases:
  - id: Pos_Fun_0100
    kind: positive
    input: api
    expected: අපි
    input_mode:
      mode: type
      delay_ms: 10
    force_reevaluation: false
"#;
        let corpus = Corpus::from_yaml(yaml).unwrap();
        let case = &corpus.cases()[0];
        assert_eq!(case.input_mode, InputMode::Type { delay_ms: 10 });
        assert!(!case.forces_reevaluation());
    }

    #[test]
    fn test_select_by_kind_and_id() {
        let corpus = Corpus::builtin().unwrap();
        let negatives = corpus
            .select(&Selection {
                kinds: vec![CaseKind::Negative],
                ids: vec![],
            })
            .unwrap();
        assert_eq!(negatives.len(), 10);
        assert_eq!(negatives.cases()[0].id, "Neg_Fun_0001");

        let one = corpus
            .select(&Selection {
                kinds: vec![],
                ids: vec!["Neg_Fun_0003".into()],
            })
            .unwrap();
        assert_eq!(one.len(), 1);

        assert!(corpus
            .select(&Selection {
                kinds: vec![],
                ids: vec!["Pos_Fun_9999".into()],
            })
            .is_err());
    }

    #[test]
    fn test_load_dir_merges_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.yaml"),
            "cases:\n  - id: A1\n    kind: positive\n    input: api\n    expected: අපි\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.yml"),
            "cases:\n  - id: B1\n    kind: negative\n    input: oya\n    expected: ඔය\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let corpus = Corpus::load(dir.path()).unwrap();
        let ids: Vec<_> = corpus.cases().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "B1"]);
    }

    #[test]
    fn test_case_kind_from_str() {
        assert_eq!("ui".parse::<CaseKind>().unwrap(), CaseKind::UiBehavior);
        assert_eq!("Negative".parse::<CaseKind>().unwrap(), CaseKind::Negative);
        assert!("smoke".parse::<CaseKind>().is_err());
    }
}
