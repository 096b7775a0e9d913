//! Study content generation on top of a [`GenerativeModel`].
//!
//! Every public method returns a usable value. Model failures, missing JSON
//! and schema mismatches are logged and replaced with a deterministic
//! fallback, so callers never have to handle AI errors.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ai::json::extract_json;
use crate::ai::model::{AiError, GenerativeModel};
use crate::segmenter::Difficulty;

/// Longest document excerpt sent in a single prompt.
const MAX_PROMPT_TEXT_CHARS: usize = 12_000;

const MAX_CONCEPTS: usize = 10;
/// Longest study plan that will be prompted for or generated locally.
pub const MAX_STUDY_PLAN_DAYS: u32 = 365;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyDay {
    pub day: u32,
    pub focus: String,
    #[serde(default)]
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlan {
    pub title: String,
    pub days: Vec<StudyDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningInsights {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptAnalysis {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnalysis {
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub marks: Option<f64>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// A retrieved excerpt handed to [`AiContentService::answer_question`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContextExcerpt {
    pub source: String,
    pub text: String,
}

#[derive(Deserialize)]
struct ConceptList {
    #[serde(default)]
    concepts: Vec<String>,
}

pub struct AiContentService {
    model: Arc<dyn GenerativeModel>,
}

impl AiContentService {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Sends `prompt` and decodes the first JSON object of the answer as `T`.
    async fn generate_json<T: DeserializeOwned>(&self, prompt: &str) -> Result<T, AiError> {
        let response = self.model.generate(prompt).await?;
        let json = extract_json(&response).ok_or(AiError::NoJson)?;
        Ok(serde_json::from_str(json)?)
    }

    fn log_fallback(&self, operation: &'static str, error: &AiError) {
        warn!(
            model = self.model.name(),
            operation, "AI request failed, using fallback: {}", error
        );
    }

    pub async fn summarize_document(&self, title: &str, text: &str) -> DocumentSummary {
        let prompt = format!(
            "Summarize the study document below for a student.\n\
             Respond with JSON only: {{\"summary\": string, \"keyPoints\": [string], \"topics\": [string]}}\n\n\
             Title: {}\n\nDocument:\n{}",
            title,
            clip(text, MAX_PROMPT_TEXT_CHARS)
        );

        match self.generate_json::<DocumentSummary>(&prompt).await {
            Ok(summary) if !summary.summary.trim().is_empty() => summary,
            Ok(_) => {
                self.log_fallback("summarize_document", &AiError::EmptyResponse);
                fallback_summary(text)
            }
            Err(e) => {
                self.log_fallback("summarize_document", &e);
                fallback_summary(text)
            }
        }
    }

    pub async fn generate_study_plan(&self, course: &str, concepts: &[String], days: u32) -> StudyPlan {
        let days = days.clamp(1, MAX_STUDY_PLAN_DAYS);
        let prompt = format!(
            "Create a {}-day study plan for the course \"{}\" covering these concepts: {}.\n\
             Respond with JSON only: {{\"title\": string, \"days\": [{{\"day\": number, \"focus\": string, \"tasks\": [string]}}]}}",
            days,
            course,
            concepts.join(", ")
        );

        match self.generate_json::<StudyPlan>(&prompt).await {
            Ok(plan) if !plan.days.is_empty() => plan,
            Ok(_) => {
                self.log_fallback("generate_study_plan", &AiError::EmptyResponse);
                fallback_study_plan(course, concepts, days)
            }
            Err(e) => {
                self.log_fallback("generate_study_plan", &e);
                fallback_study_plan(course, concepts, days)
            }
        }
    }

    /// `activity` is a plain-text description of the student's recent results.
    pub async fn generate_insights(&self, activity: &str) -> LearningInsights {
        let prompt = format!(
            "Given this student's recent study activity, identify strengths, weaknesses and recommendations.\n\
             Respond with JSON only: {{\"strengths\": [string], \"weaknesses\": [string], \"recommendations\": [string]}}\n\n\
             Activity:\n{}",
            clip(activity, MAX_PROMPT_TEXT_CHARS)
        );

        self.generate_json::<LearningInsights>(&prompt)
            .await
            .unwrap_or_else(|e| {
                self.log_fallback("generate_insights", &e);
                LearningInsights {
                    strengths: Vec::new(),
                    weaknesses: Vec::new(),
                    recommendations: vec![
                        "Review recent material and practise past questions regularly.".to_string(),
                    ],
                }
            })
    }

    /// Answers `question` from the given excerpts only.
    pub async fn answer_question(&self, question: &str, excerpts: &[ContextExcerpt]) -> Answer {
        let sources: Vec<String> = excerpts.iter().map(|e| e.source.clone()).collect();
        if excerpts.is_empty() {
            return Answer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources,
            };
        }

        let mut context = String::new();
        for (i, excerpt) in excerpts.iter().enumerate() {
            context.push_str(&format!("[{}] {}\n{}\n\n", i + 1, excerpt.source, excerpt.text));
        }
        let prompt = format!(
            "Answer the question using ONLY the numbered excerpts. If they do not contain the answer, say so.\n\
             Respond with JSON only: {{\"answer\": string, \"sources\": [string]}}\n\n\
             Excerpts:\n{}Question: {}",
            clip(&context, MAX_PROMPT_TEXT_CHARS),
            question
        );

        match self.generate_json::<Answer>(&prompt).await {
            Ok(answer) if !answer.answer.trim().is_empty() => answer,
            Ok(_) => Answer {
                answer: NO_ANSWER.to_string(),
                sources,
            },
            Err(e) => {
                self.log_fallback("answer_question", &e);
                Answer {
                    answer: NO_ANSWER.to_string(),
                    sources,
                }
            }
        }
    }

    pub async fn analyze_concept(&self, name: &str, context: &str) -> ConceptAnalysis {
        let prompt = format!(
            "Describe the academic concept \"{}\" for a student.\n\
             Respond with JSON only: {{\"description\": string, \"category\": string, \"summary\": string}}\n\n\
             Context:\n{}",
            name,
            clip(context, MAX_PROMPT_TEXT_CHARS / 4)
        );

        self.generate_json::<ConceptAnalysis>(&prompt)
            .await
            .unwrap_or_else(|e| {
                self.log_fallback("analyze_concept", &e);
                ConceptAnalysis::default()
            })
    }

    /// Returns up to ten concept names; empty when the model gives none.
    pub async fn identify_concepts(&self, texts: &[String]) -> Vec<String> {
        if texts.is_empty() {
            return Vec::new();
        }
        let prompt = format!(
            "List the main academic concepts tested by these exam questions (at most {}).\n\
             Respond with JSON only: {{\"concepts\": [string]}}\n\n\
             Questions:\n{}",
            MAX_CONCEPTS,
            clip(&texts.join("\n"), MAX_PROMPT_TEXT_CHARS)
        );

        match self.generate_json::<ConceptList>(&prompt).await {
            Ok(list) => {
                let concepts: Vec<String> = list
                    .concepts
                    .into_iter()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .take(MAX_CONCEPTS)
                    .collect();
                debug!(count = concepts.len(), "AI identified concepts");
                concepts
            }
            Err(e) => {
                self.log_fallback("identify_concepts", &e);
                Vec::new()
            }
        }
    }

    pub async fn analyze_question(&self, question: &str) -> QuestionAnalysis {
        let prompt = format!(
            "Analyze this exam question. Difficulty is one of EASY, MEDIUM, HARD, EXPERT.\n\
             Respond with JSON only: {{\"difficulty\": string, \"marks\": number|null, \"topics\": [string], \"explanation\": string}}\n\n\
             Question: {}",
            clip(question, MAX_PROMPT_TEXT_CHARS / 4)
        );

        self.generate_json::<QuestionAnalysis>(&prompt)
            .await
            .unwrap_or_else(|e| {
                self.log_fallback("analyze_question", &e);
                QuestionAnalysis::default()
            })
    }
}

const NO_CONTEXT_ANSWER: &str = "No indexed study material matches this question.";
const NO_ANSWER: &str = "An answer could not be generated from the available material.";

/// First `max` characters of `text`, never splitting a character.
fn clip(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn fallback_summary(text: &str) -> DocumentSummary {
    let summary = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(3)
        .collect::<Vec<_>>()
        .join(" ");
    DocumentSummary {
        summary: clip(&summary, 500).to_string(),
        key_points: Vec::new(),
        topics: Vec::new(),
    }
}

/// Spreads the concepts over the days round-robin.
fn fallback_study_plan(course: &str, concepts: &[String], days: u32) -> StudyPlan {
    let days = days.clamp(1, MAX_STUDY_PLAN_DAYS);
    let days = (1..=days)
        .map(|day| {
            let assigned: Vec<&str> = concepts
                .iter()
                .enumerate()
                .filter(|(i, _)| (*i as u32) % days == day - 1)
                .map(|(_, c)| c.as_str())
                .collect();
            let focus = if assigned.is_empty() {
                "Revision and practice questions".to_string()
            } else {
                assigned.join(", ")
            };
            StudyDay {
                day,
                focus,
                tasks: assigned.iter().map(|c| format!("Review {}", c)).collect(),
            }
        })
        .collect();

    StudyPlan {
        title: format!("Study plan for {}", course),
        days,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays canned responses in order; errors once they run out.
    pub struct ScriptedModel {
        responses: Mutex<VecDeque<Result<String, AiError>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn new(responses: Vec<Result<String, AiError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(text: &str) -> Self {
            Self::new(vec![Ok(text.to_string())])
        }
    }

    #[async_trait::async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn generate(&self, prompt: &str) -> Result<String, AiError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(AiError::EmptyResponse))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedModel;
    use super::*;

    fn service(model: ScriptedModel) -> AiContentService {
        AiContentService::new(Arc::new(model))
    }

    #[tokio::test]
    async fn test_summarize_parses_fenced_json() {
        let svc = service(ScriptedModel::replying(
            "```json\n{\"summary\": \"Sorting algorithms\", \"keyPoints\": [\"merge sort\"]}\n```",
        ));
        let summary = svc.summarize_document("Algorithms", "text").await;
        assert_eq!(summary.summary, "Sorting algorithms");
        assert_eq!(summary.key_points, vec!["merge sort"]);
        assert!(summary.topics.is_empty());
    }

    #[tokio::test]
    async fn test_summarize_falls_back_on_error() {
        let svc = service(ScriptedModel::new(vec![Err(AiError::Request("down".into()))]));
        let summary = svc
            .summarize_document("Notes", "First line\n\nSecond line\nThird\nFourth")
            .await;
        assert_eq!(summary.summary, "First line Second line Third");
    }

    #[tokio::test]
    async fn test_study_plan_fallback_round_robin() {
        let svc = service(ScriptedModel::replying("not json at all"));
        let concepts = vec!["Stacks".to_string(), "Queues".to_string(), "Trees".to_string()];
        let plan = svc.generate_study_plan("CS101", &concepts, 2).await;
        assert_eq!(plan.days.len(), 2);
        assert_eq!(plan.days[0].tasks, vec!["Review Stacks", "Review Trees"]);
        assert_eq!(plan.days[1].tasks, vec!["Review Queues"]);
        assert_eq!(plan.title, "Study plan for CS101");
    }

    #[tokio::test]
    async fn test_study_plan_length_is_bounded() {
        let svc = service(ScriptedModel::new(vec![Err(AiError::Request("down".into()))]));
        let plan = svc.generate_study_plan("CS101", &[], u32::MAX).await;
        assert_eq!(plan.days.len(), MAX_STUDY_PLAN_DAYS as usize);
        assert_eq!(plan.days.last().unwrap().day, MAX_STUDY_PLAN_DAYS);

        let svc = service(ScriptedModel::replying("not json at all"));
        let plan = svc.generate_study_plan("CS101", &[], 0).await;
        assert_eq!(plan.days.len(), 1);
        assert_eq!(plan.days[0].focus, "Revision and practice questions");
    }

    #[tokio::test]
    async fn test_insights_fall_back_on_error() {
        let svc = service(ScriptedModel::new(vec![Err(AiError::Request("down".into()))]));
        let insights = svc.generate_insights("Scored 40% on the graphs quiz").await;
        assert!(insights.strengths.is_empty());
        assert!(insights.weaknesses.is_empty());
        assert_eq!(insights.recommendations.len(), 1);
    }

    #[tokio::test]
    async fn test_insights_parse() {
        let svc = service(ScriptedModel::replying(
            r#"{"strengths": ["sorting"], "weaknesses": ["graphs"], "recommendations": ["Practise BFS"]}"#,
        ));
        let insights = svc.generate_insights("Scored 40% on the graphs quiz").await;
        assert_eq!(insights.weaknesses, vec!["graphs"]);
        assert_eq!(insights.recommendations, vec!["Practise BFS"]);
    }

    #[tokio::test]
    async fn test_analyze_concept_falls_back_on_error() {
        let svc = service(ScriptedModel::new(vec![Err(AiError::EmptyResponse)]));
        let analysis = svc.analyze_concept("Recursion", "A function calling itself").await;
        assert_eq!(analysis, ConceptAnalysis::default());

        let svc = service(ScriptedModel::replying("I cannot help with that"));
        let analysis = svc.analyze_concept("Recursion", "").await;
        assert_eq!(analysis, ConceptAnalysis::default());
    }

    #[tokio::test]
    async fn test_answer_without_context_skips_model() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let svc = AiContentService::new(model.clone());
        let answer = svc.answer_question("What is a heap?", &[]).await;
        assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_answer_uses_excerpts() {
        let model = Arc::new(ScriptedModel::replying(
            r#"Here you go: {"answer": "A heap is a tree.", "sources": ["Notes"]}"#,
        ));
        let svc = AiContentService::new(model.clone());
        let excerpts = vec![ContextExcerpt {
            source: "Notes".to_string(),
            text: "A heap is a complete binary tree.".to_string(),
        }];
        let answer = svc.answer_question("What is a heap?", &excerpts).await;
        assert_eq!(answer.answer, "A heap is a tree.");
        assert!(model.prompts.lock().unwrap()[0].contains("complete binary tree"));
    }

    #[tokio::test]
    async fn test_identify_concepts_trims_and_limits() {
        let names: Vec<String> = (0..15).map(|i| format!("\"  C{}  \"", i)).collect();
        let svc = service(ScriptedModel::replying(&format!(
            "{{\"concepts\": [{}, \"\"]}}",
            names.join(", ")
        )));
        let concepts = svc.identify_concepts(&["Q1".to_string()]).await;
        assert_eq!(concepts.len(), MAX_CONCEPTS);
        assert_eq!(concepts[0], "C0");
    }

    #[tokio::test]
    async fn test_identify_concepts_error_is_empty() {
        let svc = service(ScriptedModel::new(vec![Err(AiError::EmptyResponse)]));
        assert!(svc.identify_concepts(&["Q1".to_string()]).await.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_question_bad_schema_falls_back() {
        let svc = service(ScriptedModel::replying(r#"{"difficulty": "IMPOSSIBLE"}"#));
        let analysis = svc.analyze_question("Prove P != NP").await;
        assert_eq!(analysis.difficulty, Difficulty::Medium);
        assert!(analysis.topics.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_question_parses() {
        let svc = service(ScriptedModel::replying(
            r#"{"difficulty": "HARD", "marks": 10, "topics": ["graphs"]}"#,
        ));
        let analysis = svc.analyze_question("Prove Dijkstra is correct").await;
        assert_eq!(analysis.difficulty, Difficulty::Hard);
        assert_eq!(analysis.marks, Some(10.0));
    }

    #[test]
    fn test_clip_respects_char_boundaries() {
        assert_eq!(clip("héllo", 2), "hé");
        assert_eq!(clip("abc", 10), "abc");
    }
}
