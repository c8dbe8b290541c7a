//! Typed calendar events derived from household entities.
//!
//! Each event is addressed by an [`EventKey`] built from its kind and the id
//! of the entity it mirrors. The key doubles as the retry-queue id, so a newer
//! call for the same entity replaces an older one still waiting in the queue.

use chrono::{DateTime, Utc};
use household_model::{CareKind, CareTask, Plant, Project, SimpleTask};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which household entity an event mirrors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PlantCare,
    ProjectDeadline,
    TaskDue,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PlantCare => "plant_care",
            EventKind::ProjectDeadline => "project_deadline",
            EventKind::TaskDue => "task_due",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable address of the calendar event for one entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub kind: EventKind,
    pub entity_id: String,
}

impl EventKey {
    pub fn new(kind: EventKind, entity_id: impl Into<String>) -> Self {
        Self {
            kind,
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "calendar:{}:{}", self.kind, self.entity_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalendarEvent {
    PlantCare {
        plant_id: String,
        plant_name: String,
        care_task_id: String,
        care_kind: CareKind,
        title: String,
        due: DateTime<Utc>,
    },
    ProjectDeadline {
        project_id: String,
        project_name: String,
        due: DateTime<Utc>,
    },
    TaskDue {
        task_id: String,
        title: String,
        due: DateTime<Utc>,
    },
}

impl CalendarEvent {
    /// Event for a plant care task, if the task is open and has a due date
    pub fn for_care_task(plant: &Plant, task: &CareTask) -> Option<Self> {
        if task.completed {
            return None;
        }
        Some(CalendarEvent::PlantCare {
            plant_id: plant.id.clone(),
            plant_name: plant.name.clone(),
            care_task_id: task.id.clone(),
            care_kind: task.kind,
            title: task.title.clone(),
            due: task.due_date?,
        })
    }

    pub fn for_project(project: &Project) -> Option<Self> {
        Some(CalendarEvent::ProjectDeadline {
            project_id: project.id.clone(),
            project_name: project.name.clone(),
            due: project.due_date?,
        })
    }

    pub fn for_task(task: &SimpleTask) -> Option<Self> {
        if task.completed {
            return None;
        }
        Some(CalendarEvent::TaskDue {
            task_id: task.id.clone(),
            title: task.title.clone(),
            due: task.due_date?,
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            CalendarEvent::PlantCare { .. } => EventKind::PlantCare,
            CalendarEvent::ProjectDeadline { .. } => EventKind::ProjectDeadline,
            CalendarEvent::TaskDue { .. } => EventKind::TaskDue,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            CalendarEvent::PlantCare { care_task_id, .. } => care_task_id,
            CalendarEvent::ProjectDeadline { project_id, .. } => project_id,
            CalendarEvent::TaskDue { task_id, .. } => task_id,
        }
    }

    pub fn key(&self) -> EventKey {
        EventKey::new(self.kind(), self.entity_id())
    }

    pub fn due(&self) -> DateTime<Utc> {
        match self {
            CalendarEvent::PlantCare { due, .. }
            | CalendarEvent::ProjectDeadline { due, .. }
            | CalendarEvent::TaskDue { due, .. } => *due,
        }
    }

    /// Human-readable event title
    pub fn summary(&self) -> String {
        match self {
            CalendarEvent::PlantCare {
                plant_name,
                care_kind,
                title,
                ..
            } => {
                let verb = match care_kind {
                    CareKind::Watering => "Water",
                    CareKind::Fertilizing => "Fertilize",
                    CareKind::Pruning => "Prune",
                    CareKind::Repotting => "Repot",
                    CareKind::Other => return format!("{}: {}", plant_name, title),
                };
                format!("{} {}", verb, plant_name)
            }
            CalendarEvent::ProjectDeadline { project_name, .. } => {
                format!("Project due: {}", project_name)
            }
            CalendarEvent::TaskDue { title, .. } => format!("Task due: {}", title),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_key_format() {
        let key = EventKey::new(EventKind::ProjectDeadline, "proj-7");
        assert_eq!(key.to_string(), "calendar:project_deadline:proj-7");
    }

    #[test]
    fn test_care_task_event() {
        let now = Utc::now();
        let plant = Plant::new("p1", "u1", "Fig", now);
        let mut task = CareTask::new("c1", "Weekly water", now);
        assert!(CalendarEvent::for_care_task(&plant, &task).is_none());

        task.due_date = Some(now + Duration::days(7));
        let event = CalendarEvent::for_care_task(&plant, &task).unwrap();
        assert_eq!(event.key().to_string(), "calendar:plant_care:c1");
        assert_eq!(event.summary(), "Water Fig");
        assert_eq!(event.due(), now + Duration::days(7));

        task.completed = true;
        assert!(CalendarEvent::for_care_task(&plant, &task).is_none());
    }

    #[test]
    fn test_other_care_uses_task_title() {
        let now = Utc::now();
        let plant = Plant::new("p1", "u1", "Fig", now);
        let mut task = CareTask::new("c1", "Check for mites", now);
        task.kind = CareKind::Other;
        task.due_date = Some(now);
        let event = CalendarEvent::for_care_task(&plant, &task).unwrap();
        assert_eq!(event.summary(), "Fig: Check for mites");
    }

    #[test]
    fn test_project_and_task_events() {
        let now = Utc::now();
        let mut project = Project::new("proj-1", "u1", "Paint fence", now);
        assert!(CalendarEvent::for_project(&project).is_none());
        project.due_date = Some(now);
        assert_eq!(
            CalendarEvent::for_project(&project).unwrap().summary(),
            "Project due: Paint fence"
        );

        let mut task = SimpleTask::new("t1", "u1", "Call plumber", now);
        task.due_date = Some(now);
        let event = CalendarEvent::for_task(&task).unwrap();
        assert_eq!(event.kind(), EventKind::TaskDue);
        assert_eq!(event.entity_id(), "t1");
    }

    #[test]
    fn test_wire_shape() {
        let now = Utc::now();
        let event = CalendarEvent::TaskDue {
            task_id: "t1".into(),
            title: "Call plumber".into(),
            due: now,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "task_due");
        assert_eq!(json["task_id"], "t1");
    }
}
