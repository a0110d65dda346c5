use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Profile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Agenda {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner_id: String,
    #[serde(default)]
    pub join_key: String,
    pub created_at: DateTime<Utc>,
}

impl Agenda {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AgendaSection {
    pub id: String,
    pub agenda_id: String,
    pub name: String,
    #[serde(default)]
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AgendaElement {
    pub id: String,
    pub agenda_id: String,
    pub section_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgendaMember {
    pub agenda_id: String,
    pub user_id: String,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgendaEditor {
    pub agenda_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AgendaComment {
    pub id: String,
    pub agenda_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Per-viewer "completed" annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedElement {
    pub user_id: String,
    pub element_id: String,
}

/// Per-viewer "urgent" annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrgentElement {
    pub user_id: String,
    pub element_id: String,
}

/// The two per-viewer flags an element can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    Urgent,
    Completed,
}

/// An element joined with the current viewer's annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ElementView {
    #[serde(flatten)]
    pub element: AgendaElement,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default)]
    pub is_completed: bool,
}

impl ElementView {
    /// Join an element against the viewer's urgent/completed id sets.
    pub fn annotate(
        element: AgendaElement,
        urgent: &HashSet<String>,
        completed: &HashSet<String>,
    ) -> Self {
        let is_urgent = urgent.contains(&element.id);
        let is_completed = completed.contains(&element.id);
        Self {
            element,
            is_urgent,
            is_completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SectionWithElements {
    #[serde(flatten)]
    pub section: AgendaSection,
    #[serde(default)]
    pub elements: Vec<AgendaElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionView {
    pub section: AgendaSection,
    pub items: Vec<ElementView>,
}

/// Everything the agenda screen needs, cached under one agenda id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AgendaBundle {
    pub agenda: Agenda,
    #[serde(default)]
    pub sections: Vec<SectionWithElements>,
    #[serde(default)]
    pub members: Vec<Profile>,
    #[serde(default)]
    pub editor_ids: Vec<String>,
    #[serde(default)]
    pub completed: BTreeMap<String, bool>,
    #[serde(default)]
    pub urgent: BTreeMap<String, bool>,
}

impl AgendaBundle {
    pub fn is_urgent(&self, element_id: &str) -> bool {
        self.urgent.get(element_id).copied().unwrap_or(false)
    }

    pub fn is_completed(&self, element_id: &str) -> bool {
        self.completed.get(element_id).copied().unwrap_or(false)
    }

    pub fn can_edit(&self, user_id: &str) -> bool {
        self.agenda.is_owned_by(user_id) || self.editor_ids.iter().any(|id| id == user_id)
    }

    pub fn contains_element(&self, element_id: &str) -> bool {
        self.find_element(element_id).is_some()
    }

    pub fn find_element(&self, element_id: &str) -> Option<&AgendaElement> {
        self.sections
            .iter()
            .flat_map(|s| s.elements.iter())
            .find(|e| e.id == element_id)
    }

    /// Record or clear one of the viewer's annotations.
    pub fn set_annotation(&mut self, element_id: &str, annotation: Annotation, on: bool) {
        let map = match annotation {
            Annotation::Urgent => &mut self.urgent,
            Annotation::Completed => &mut self.completed,
        };
        if on {
            map.insert(element_id.to_string(), true);
        } else {
            map.remove(element_id);
        }
    }

    /// Drop an element and its annotations. Returns whether it was present.
    pub fn remove_element(&mut self, element_id: &str) -> bool {
        let mut removed = false;
        for section in &mut self.sections {
            let before = section.elements.len();
            section.elements.retain(|e| e.id != element_id);
            removed |= section.elements.len() != before;
        }
        self.urgent.remove(element_id);
        self.completed.remove(element_id);
        removed
    }

    pub fn view_of(&self, element_id: &str) -> Option<ElementView> {
        self.find_element(element_id).map(|e| ElementView {
            element: e.clone(),
            is_urgent: self.is_urgent(element_id),
            is_completed: self.is_completed(element_id),
        })
    }

    /// Sections in position order, each with viewer-annotated items sorted
    /// urgent-first then by deadline.
    pub fn section_views(&self) -> Vec<SectionView> {
        let mut sections: Vec<&SectionWithElements> = self.sections.iter().collect();
        sections.sort_by_key(|s| s.section.position);

        sections
            .into_iter()
            .map(|s| {
                let mut items: Vec<ElementView> = s
                    .elements
                    .iter()
                    .filter_map(|e| self.view_of(&e.id))
                    .collect();
                sort_by_urgency(&mut items);
                SectionView {
                    section: s.section.clone(),
                    items,
                }
            })
            .collect()
    }
}

/// Urgent items before non-urgent; within equal urgency ascending by
/// deadline, items without a deadline last.
pub fn compare_urgency(a: &ElementView, b: &ElementView) -> Ordering {
    b.is_urgent
        .cmp(&a.is_urgent)
        .then_with(|| match (a.element.deadline, b.element.deadline) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

pub fn sort_by_urgency(items: &mut [ElementView]) {
    items.sort_by(compare_urgency);
}
