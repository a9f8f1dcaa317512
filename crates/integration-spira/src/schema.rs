use serde::de::DeserializeOwned;
use serde::Deserialize;
use spira_domain::{Artifact, ArtifactType, CoreError};

/// Decodes a collection response into artifacts, preserving server order.
///
/// Any record missing a required field, carrying a wrong-typed field or a zero
/// identifier fails the whole collection.
pub fn parse_artifacts(
    category: ArtifactType,
    payload: serde_json::Value,
) -> Result<Vec<Artifact>, CoreError> {
    match category {
        ArtifactType::Requirement => decode::<RequirementRecord>(category, payload),
        ArtifactType::Task => decode::<TaskRecord>(category, payload),
        ArtifactType::Incident => decode::<IncidentRecord>(category, payload),
    }
}

fn decode<R>(category: ArtifactType, payload: serde_json::Value) -> Result<Vec<Artifact>, CoreError>
where
    R: DeserializeOwned + Into<RecordFields>,
{
    let records: Vec<R> = serde_json::from_value(payload).map_err(|error| {
        CoreError::MalformedPayload(format!(
            "failed to decode Spira {} payload: {error}",
            category.collection()
        ))
    })?;

    records
        .into_iter()
        .map(|record| record.into().into_artifact(category))
        .collect()
}

struct RecordFields {
    name: String,
    artifact_id: i64,
    project_id: i64,
    project_name: Option<String>,
    description: Option<String>,
    priority_name: Option<String>,
    status: Option<String>,
    kind: Option<String>,
}

impl RecordFields {
    fn into_artifact(self, category: ArtifactType) -> Result<Artifact, CoreError> {
        if self.artifact_id == 0 {
            return Err(CoreError::MalformedPayload(format!(
                "Spira {} record `{}` has a zero identifier.",
                category.collection(),
                self.name
            )));
        }

        Ok(Artifact {
            name: self.name,
            artifact_type: category,
            project_id: self.project_id,
            project_name: self.project_name.unwrap_or_default(),
            artifact_id: self.artifact_id,
            description: self.description.unwrap_or_default(),
            priority_name: self.priority_name.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
            kind: self.kind.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RequirementRecord {
    name: String,
    requirement_id: i64,
    project_id: i64,
    project_name: Option<String>,
    description: Option<String>,
    importance_name: Option<String>,
    status_name: Option<String>,
    requirement_type_name: Option<String>,
}

impl From<RequirementRecord> for RecordFields {
    fn from(value: RequirementRecord) -> Self {
        Self {
            name: value.name,
            artifact_id: value.requirement_id,
            project_id: value.project_id,
            project_name: value.project_name,
            description: value.description,
            priority_name: value.importance_name,
            status: value.status_name,
            kind: value.requirement_type_name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TaskRecord {
    name: String,
    task_id: i64,
    project_id: i64,
    project_name: Option<String>,
    description: Option<String>,
    task_priority_name: Option<String>,
    task_status_name: Option<String>,
    task_type_name: Option<String>,
}

impl From<TaskRecord> for RecordFields {
    fn from(value: TaskRecord) -> Self {
        Self {
            name: value.name,
            artifact_id: value.task_id,
            project_id: value.project_id,
            project_name: value.project_name,
            description: value.description,
            priority_name: value.task_priority_name,
            status: value.task_status_name,
            kind: value.task_type_name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IncidentRecord {
    name: String,
    incident_id: i64,
    project_id: i64,
    project_name: Option<String>,
    description: Option<String>,
    priority_name: Option<String>,
    incident_status_name: Option<String>,
    incident_type_name: Option<String>,
}

impl From<IncidentRecord> for RecordFields {
    fn from(value: IncidentRecord) -> Self {
        Self {
            name: value.name,
            artifact_id: value.incident_id,
            project_id: value.project_id,
            project_name: value.project_name,
            description: value.description,
            priority_name: value.priority_name,
            status: value.incident_status_name,
            kind: value.incident_type_name,
        }
    }
}
