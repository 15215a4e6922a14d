//! Default-pattern templates: one structural rule standing in for many
//! re-exports of the shape `export { X } from './X/X'`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::specifier::{Specifier, SpecifierKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    Text(String),
    /// Placeholder for the exported name.
    Name,
}

/// An occurrence of `name` counts only at a word boundary: a separator or
/// the edge of `text` on both sides, or a camel-case hump.
fn is_bounded(text: &str, start: usize, end: usize, name: &str) -> bool {
    let starts_upper = name.chars().next().is_some_and(char::is_uppercase);
    let before = match text[..start].chars().next_back() {
        None => true,
        Some(c) => !c.is_alphanumeric() || (starts_upper && !c.is_uppercase()),
    };
    let after = match text[end..].chars().next() {
        None => true,
        Some(c) => !c.is_alphanumeric() || c.is_uppercase(),
    };
    before && after
}

fn split_on(text: &str, name: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;
    for (idx, _) in text.match_indices(name) {
        let end = idx + name.len();
        if !is_bounded(text, idx, end, name) {
            continue;
        }
        if idx > last {
            segments.push(Segment::Text(text[last..idx].to_string()));
        }
        segments.push(Segment::Name);
        last = end;
    }
    if last < text.len() {
        segments.push(Segment::Text(text[last..].to_string()));
    }
    segments
}

fn fill(segments: &[Segment], name: &str) -> String {
    segments
        .iter()
        .map(|segment| match segment {
            Segment::Text(text) => text.as_str(),
            Segment::Name => name,
        })
        .collect()
}

/// A named re-export with the exported name abstracted out of the module
/// path (relative to `base_dir`) and the local name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternTemplate {
    base_dir: PathBuf,
    module_path: Vec<Segment>,
    local_name: Vec<Segment>,
    kind: SpecifierKind,
}

impl PatternTemplate {
    /// Abstracts `spec` (exported from a barrel in `base_dir`). Namespace
    /// bindings, the `default` export itself, modules outside `base_dir` and
    /// paths that do not mention the exported name have no template.
    pub fn derive(spec: &Specifier, base_dir: &Path) -> Option<Self> {
        let name = spec.external_name.as_str();
        if name.is_empty() || name == "default" || spec.kind == SpecifierKind::Namespace {
            return None;
        }
        let relative = spec.module_path.strip_prefix(base_dir).ok()?;
        let relative: Vec<String> =
            relative.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect();
        let module_path = split_on(&relative.join("/"), name);
        if !module_path.contains(&Segment::Name) {
            return None;
        }
        Some(Self {
            base_dir: base_dir.to_path_buf(),
            module_path,
            local_name: split_on(spec.binding_name(), name),
            kind: spec.kind,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn kind(&self) -> SpecifierKind {
        self.kind
    }

    /// The specifier this template predicts for `name`.
    pub fn instantiate(&self, name: &str) -> Specifier {
        let module_path = self.base_dir.join(fill(&self.module_path, name));
        Specifier::export(module_path, fill(&self.local_name, name), name)
    }
}

/// A template together with how many re-exports it absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultPattern {
    template: PatternTemplate,
    uses: usize,
    #[serde(skip)]
    seed: Option<Specifier>,
}

impl DefaultPattern {
    /// Starts a pattern from the first re-export that has a template.
    pub fn seed(spec: &Specifier, base_dir: &Path) -> Option<Self> {
        let template = PatternTemplate::derive(spec, base_dir)?;
        Some(Self { template, uses: 1, seed: Some(spec.clone()) })
    }

    /// Counts `spec` as covered when it has exactly this pattern's template.
    pub fn try_absorb(&mut self, spec: &Specifier) -> bool {
        match PatternTemplate::derive(spec, &self.template.base_dir) {
            Some(template) if template == self.template => {
                self.uses += 1;
                true
            }
            _ => false,
        }
    }

    pub fn template(&self) -> &PatternTemplate {
        &self.template
    }

    pub fn uses(&self) -> usize {
        self.uses
    }

    /// The only specifier absorbed, when the pattern was used exactly once.
    pub fn single_use(&self) -> Option<&Specifier> {
        if self.uses == 1 { self.seed.as_ref() } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir() -> PathBuf {
        PathBuf::from("/p/components")
    }

    #[test]
    fn test_derive_and_instantiate() {
        let spec = Specifier::export("/p/components/Button/Button.js", "Button", "Button");
        let template = PatternTemplate::derive(&spec, &dir()).unwrap();
        let card = template.instantiate("Card");
        assert_eq!(card.module_path, PathBuf::from("/p/components/Card/Card.js"));
        assert_eq!(card.local_name, "Card");
        assert_eq!(card.external_name, "Card");
        assert_eq!(card.kind, SpecifierKind::Named);
    }

    #[test]
    fn test_default_bindings_get_a_template() {
        let icon = Specifier::export("/p/components/Icon/Icon.js", "default", "Icon");
        let template = PatternTemplate::derive(&icon, &dir()).unwrap();
        assert_eq!(template.kind(), SpecifierKind::Default);

        let add = template.instantiate("Add");
        assert_eq!(add.module_path, PathBuf::from("/p/components/Add/Add.js"));
        assert_eq!(add.binding_name(), "default");
        assert_eq!(add.kind, SpecifierKind::Default);

        let named = Specifier::export("/p/components/Card/Card.js", "Card", "Card");
        assert_ne!(PatternTemplate::derive(&named, &dir()), Some(template));
    }

    #[test]
    fn test_no_template_for_namespaces_or_unrelated_paths() {
        let ns = Specifier::export("/p/components/Icons/Icons.js", "*", "Icons");
        assert!(PatternTemplate::derive(&ns, &dir()).is_none());

        let renamed = Specifier::export("/p/components/misc.js", "Button", "Button");
        assert!(PatternTemplate::derive(&renamed, &dir()).is_none());

        let outside = Specifier::export("/p/other/Button.js", "Button", "Button");
        assert!(PatternTemplate::derive(&outside, &dir()).is_none());
    }

    #[test]
    fn test_absorb_matching_structure_only() {
        let button = Specifier::export("/p/components/Button/Button.js", "Button", "Button");
        let card = Specifier::export("/p/components/Card/Card.js", "Card", "Card");
        let flat = Specifier::export("/p/components/Menu.js", "Menu", "Menu");

        let mut pattern = DefaultPattern::seed(&button, &dir()).unwrap();
        assert_eq!(pattern.single_use(), Some(&button));
        assert!(pattern.try_absorb(&card));
        assert!(!pattern.try_absorb(&flat));
        assert_eq!(pattern.uses(), 2);
        assert_eq!(pattern.single_use(), None);
    }

    #[test]
    fn test_name_matches_only_at_word_boundaries() {
        assert_eq!(
            split_on("Buttons/s.js", "s"),
            vec![Segment::Text("Buttons/".to_string()), Segment::Name, Segment::Text(".js".to_string())]
        );
        assert_eq!(split_on("Cards/Card.js", "Card")[0], Segment::Text("Cards/".to_string()));

        let short = Specifier::export("/p/components/Buttons/s.js", "s", "s");
        let template = PatternTemplate::derive(&short, &dir()).unwrap();
        assert_eq!(
            template.instantiate("t").module_path,
            PathBuf::from("/p/components/Buttons/t.js")
        );
    }

    #[test]
    fn test_local_name_follows_exported_name() {
        let spec = Specifier::export("/p/icons/ArrowIcon.js", "ArrowIconImpl", "Arrow");
        let template = PatternTemplate::derive(&spec, Path::new("/p/icons")).unwrap();
        let close = template.instantiate("Close");
        assert_eq!(close.module_path, PathBuf::from("/p/icons/CloseIcon.js"));
        assert_eq!(close.local_name, "CloseIconImpl");
    }
}
