// medbot-core/src/tools/dataset.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::ToolExecutor;
use crate::models::tools::{ToolDefinition, ToolInput};
use crate::sql::SqlAgent;

/// The fixed set of tabular datasets the assistant can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Heart,
    Cancer,
    Diabetes,
}

impl Dataset {
    pub const ALL: [Dataset; 3] = [Dataset::Heart, Dataset::Cancer, Dataset::Diabetes];

    pub fn tool_name(&self) -> &'static str {
        match self {
            Dataset::Heart => "query_heart_db",
            Dataset::Cancer => "query_cancer_db",
            Dataset::Diabetes => "query_diabetes_db",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Dataset::Heart => "Use for heart-disease dataset statistics: counts, averages and distributions over heart patients (age, sex, chest pain type, blood pressure, cholesterol, heart disease outcome).",
            Dataset::Cancer => "Use for cancer dataset analysis: counts, averages and comparisons over cancer patients (tumor measurements, diagnosis).",
            Dataset::Diabetes => "Use for diabetes dataset analysis: counts, averages and comparisons over diabetes patients (glucose, blood pressure, BMI, insulin, age, diabetes outcome).",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Dataset::Heart => "heart disease",
            Dataset::Cancer => "cancer",
            Dataset::Diabetes => "diabetes",
        }
    }

    pub fn database_file(&self) -> &'static str {
        match self {
            Dataset::Heart => "heart_disease.db",
            Dataset::Cancer => "cancer.db",
            Dataset::Diabetes => "diabetes.db",
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            Dataset::Heart => "heart_patients",
            Dataset::Cancer => "cancer_patients",
            Dataset::Diabetes => "diabetes_patients",
        }
    }

    pub fn csv_file(&self) -> &'static str {
        match self {
            Dataset::Heart => "heart.csv",
            Dataset::Cancer => "cancer.csv",
            Dataset::Diabetes => "diabetes.csv",
        }
    }

    pub fn tool_definition(&self) -> ToolDefinition {
        ToolDefinition::single_question(
            self.tool_name(),
            self.description(),
            format!(
                "A natural-language question about the {} dataset.",
                self.label()
            ),
        )
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Answers a dataset question through the agent bound to that dataset.
pub struct DatasetTool {
    dataset: Dataset,
    agent: Arc<dyn SqlAgent>,
}

impl DatasetTool {
    pub fn new(dataset: Dataset, agent: Arc<dyn SqlAgent>) -> Self {
        Self { dataset, agent }
    }
}

#[async_trait]
impl ToolExecutor for DatasetTool {
    async fn execute(&self, input: &ToolInput) -> Result<String> {
        let question = input.required_str("question").map_err(|e| anyhow!(e))?;
        info!(dataset = %self.dataset, "Delegating question to SQL agent.");
        self.agent.invoke(question).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct RecordingAgent {
        questions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SqlAgent for RecordingAgent {
        async fn invoke(&self, question: &str) -> Result<String> {
            self.questions.lock().unwrap().push(question.to_string());
            Ok("The average age is 54.4 years.".to_string())
        }
    }

    #[test]
    fn test_dataset_names_are_unique() {
        let names: HashSet<_> = Dataset::ALL.iter().map(|d| d.tool_name()).collect();
        assert_eq!(names.len(), 3);
        let files: HashSet<_> = Dataset::ALL.iter().map(|d| d.database_file()).collect();
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_tool_definition_has_single_required_question() {
        for dataset in Dataset::ALL {
            let def = dataset.tool_definition();
            assert_eq!(def.name, dataset.tool_name());
            assert_eq!(def.parameters.required, vec!["question".to_string()]);
            assert_eq!(def.parameters.properties.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_dataset_tool_forwards_question() {
        let agent = Arc::new(RecordingAgent {
            questions: Mutex::new(Vec::new()),
        });
        let tool = DatasetTool::new(Dataset::Heart, agent.clone());
        let input: ToolInput = serde_json::from_value(json!({
            "arguments": { "question": "average age of heart patients" }
        }))
        .unwrap();
        let answer = tool.execute(&input).await.unwrap();
        assert_eq!(answer, "The average age is 54.4 years.");
        assert_eq!(
            agent.questions.lock().unwrap().as_slice(),
            ["average age of heart patients"]
        );
    }
}
