use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::task::{NewTask, AUTO_TASK_MARKER};
use crate::domain::upload::DocumentKind;
use crate::store::{DealStore, TaskStore, UploadStore};

use super::bus::{AutomationHandler, HandlerError};
use super::events::DomainEvent;

const UNMATCHED_CONFIDENCE: f64 = 0.3;

/// Priority-ordered filename rules. First match wins.
const RULES: [(&str, DocumentKind, f64, &str); 7] = [
    ("title", DocumentKind::Title, 0.9, r"(?:^|[^a-z])(?:title|abstract|vesting)(?:[^a-z]|$)"),
    (
        "phase_i_esa",
        DocumentKind::Environmental,
        0.85,
        r"phase[\s_-]*(?:i|1|one)(?:[^a-z0-9]|$)|(?:^|[^a-z])esa(?:[^a-z]|$)",
    ),
    ("environmental", DocumentKind::Environmental, 0.75, r"environmental|wetland|flood|geotech|soil"),
    (
        "survey",
        DocumentKind::Survey,
        0.85,
        r"survey|(?:^|[^a-z])(?:plat|alta|boundary|topo)(?:[^a-z]|$)",
    ),
    (
        "financial",
        DocumentKind::Financial,
        0.8,
        r"pro[\s_-]?forma|financial|budget|rent[\s_-]?roll|appraisal|operating[\s_-]?statement|(?:^|[^a-z])t[\s_-]?12(?:[^0-9]|$)",
    ),
    (
        "legal",
        DocumentKind::Legal,
        0.8,
        r"(?:^|[^a-z])(?:psa|loi|deed|leases?|easements?|contracts?|agreements?)(?:[^a-z]|$)|purchase[\s_-]?(?:and[\s_-]?)?sale",
    ),
    ("correspondence", DocumentKind::Legal, 0.6, r"letter|memo|notice|correspondence"),
];

struct CompiledRule {
    name: &'static str,
    kind: DocumentKind,
    confidence: f64,
    pattern: Regex,
}

fn compiled_rules() -> &'static [CompiledRule] {
    static COMPILED: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .filter_map(|(name, kind, confidence, pattern)| {
                Regex::new(pattern).ok().map(|pattern| CompiledRule {
                    name: *name,
                    kind: *kind,
                    confidence: *confidence,
                    pattern,
                })
            })
            .collect()
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentClassification {
    pub kind: DocumentKind,
    pub confidence: f64,
    pub rule: Option<String>,
}

/// Classifies a document by filename. Matching is case-insensitive.
pub fn classify_document(filename: &str) -> DocumentClassification {
    let normalized = filename.to_lowercase();
    compiled_rules()
        .iter()
        .find(|rule| rule.pattern.is_match(&normalized))
        .map(|rule| DocumentClassification {
            kind: rule.kind,
            confidence: rule.confidence,
            rule: Some(rule.name.to_string()),
        })
        .unwrap_or(DocumentClassification {
            kind: DocumentKind::Other,
            confidence: UNMATCHED_CONFIDENCE,
            rule: None,
        })
}

/// Reacts to `upload.created`: fills in a missing classification or flags a confident
/// disagreement for human review.
pub struct DocumentClassificationHandler {
    uploads: Arc<dyn UploadStore>,
    deals: Arc<dyn DealStore>,
    tasks: Arc<dyn TaskStore>,
    min_confidence: f64,
}

impl DocumentClassificationHandler {
    pub fn new(
        uploads: Arc<dyn UploadStore>,
        deals: Arc<dyn DealStore>,
        tasks: Arc<dyn TaskStore>,
        min_confidence: f64,
    ) -> Self {
        Self { uploads, deals, tasks, min_confidence }
    }
}

#[async_trait]
impl AutomationHandler for DocumentClassificationHandler {
    fn name(&self) -> &'static str {
        "document_classification"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<Option<Value>, HandlerError> {
        let DomainEvent::UploadCreated { deal_id, upload_id, org_id } = event else {
            return Ok(None);
        };
        let Some(upload) = self.uploads.find(upload_id).await? else {
            return Ok(Some(json!({ "action": "skipped", "reason": "upload_not_found" })));
        };

        let classification = classify_document(&upload.filename);
        let confident = classification.confidence >= self.min_confidence;

        if upload.kind == DocumentKind::Other {
            if classification.kind != DocumentKind::Other && confident {
                self.uploads.update_kind(upload_id, classification.kind).await?;
                return Ok(Some(json!({
                    "action": "reclassified",
                    "kind": classification.kind,
                    "confidence": classification.confidence,
                    "rule": classification.rule,
                })));
            }
            return Ok(Some(json!({ "action": "none" })));
        }

        if classification.kind == upload.kind || !confident {
            return Ok(Some(json!({ "action": "none" })));
        }

        let pipeline_step = self
            .deals
            .find(deal_id)
            .await?
            .and_then(|deal| deal.status.pipeline_step())
            .unwrap_or(0);
        // The trailing colon keeps `upload-1` from matching an open task for `upload-10`.
        let marker = format!("{AUTO_TASK_MARKER} Review classification for upload {}:", upload_id.0);
        let created = self
            .tasks
            .create_if_no_open_match(
                deal_id,
                &marker,
                NewTask {
                    org_id: org_id.clone(),
                    deal_id: deal_id.clone(),
                    title: format!("{marker} {}", upload.filename),
                    description: Some(format!(
                        "Filed as {} but the filename suggests {} (rule {}, confidence {:.2}).",
                        upload.kind.as_str(),
                        classification.kind.as_str(),
                        classification.rule.as_deref().unwrap_or("none"),
                        classification.confidence,
                    )),
                    pipeline_step,
                },
            )
            .await?;

        let action = if created.is_some() { "review_task_created" } else { "review_task_exists" };
        Ok(Some(json!({ "action": action, "suggestedKind": classification.kind })))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{classify_document, compiled_rules, DocumentClassificationHandler, RULES};
    use crate::automation::bus::AutomationHandler;
    use crate::automation::events::DomainEvent;
    use crate::domain::deal::{Deal, DealId, DealStatus, OrgId};
    use crate::domain::upload::{DocumentKind, Upload, UploadId};
    use crate::store::{
        DealStore, InMemoryDealStore, InMemoryTaskStore, InMemoryUploadStore, TaskStore,
        UploadStore,
    };

    #[test]
    fn every_rule_compiles() {
        assert_eq!(compiled_rules().len(), RULES.len());
    }

    #[test]
    fn filenames_map_to_expected_kinds() {
        let cases = [
            ("Title_Commitment_2024.pdf", DocumentKind::Title, 0.9),
            ("phase_i_esa_report.pdf", DocumentKind::Environmental, 0.85),
            ("Phase 1 ESA.pdf", DocumentKind::Environmental, 0.85),
            ("wetland-delineation.pdf", DocumentKind::Environmental, 0.75),
            ("ALTA survey final.pdf", DocumentKind::Survey, 0.85),
            ("rent_roll_march.xlsx", DocumentKind::Financial, 0.8),
            ("Signed PSA.pdf", DocumentKind::Legal, 0.8),
            ("zoning letter from parish.pdf", DocumentKind::Legal, 0.6),
        ];
        for (filename, kind, confidence) in cases {
            let result = classify_document(filename);
            assert_eq!(result.kind, kind, "{filename}");
            assert_eq!(result.confidence, confidence, "{filename}");
        }
    }

    #[test]
    fn unmatched_files_are_other_with_low_confidence() {
        let result = classify_document("IMG_2041.jpg");
        assert_eq!(result.kind, DocumentKind::Other);
        assert_eq!(result.confidence, 0.3);
        assert_eq!(result.rule, None);
    }

    #[test]
    fn classification_ignores_case() {
        for filename in ["Title_Commitment.pdf", "phase_i_esa.pdf", "Lease-Amendment.docx", "x.bin"] {
            let lower = classify_document(filename);
            let upper = classify_document(&filename.to_uppercase());
            assert_eq!(lower.kind, upper.kind);
            assert_eq!(lower.confidence, upper.confidence);
        }
    }

    struct Fixture {
        uploads: Arc<InMemoryUploadStore>,
        tasks: Arc<InMemoryTaskStore>,
        handler: DocumentClassificationHandler,
    }

    async fn fixture(filename: &str, kind: DocumentKind) -> Fixture {
        let uploads = Arc::new(InMemoryUploadStore::default());
        let deals = Arc::new(InMemoryDealStore::default());
        let tasks = Arc::new(InMemoryTaskStore::default());
        deals
            .save(Deal {
                id: DealId("deal-1".into()),
                org_id: OrgId("org-1".into()),
                name: "Airline Hwy".into(),
                status: DealStatus::Preapp,
                sku: None,
                jurisdiction_id: None,
            })
            .await
            .expect("save deal");
        uploads
            .save(Upload {
                id: UploadId("upload-1".into()),
                org_id: OrgId("org-1".into()),
                deal_id: DealId("deal-1".into()),
                filename: filename.into(),
                kind,
            })
            .await
            .expect("save upload");
        let handler =
            DocumentClassificationHandler::new(uploads.clone(), deals, tasks.clone(), 0.7);
        Fixture { uploads, tasks, handler }
    }

    fn upload_created() -> DomainEvent {
        DomainEvent::UploadCreated {
            deal_id: DealId("deal-1".into()),
            upload_id: UploadId("upload-1".into()),
            org_id: OrgId("org-1".into()),
        }
    }

    #[tokio::test]
    async fn unclassified_upload_is_reclassified_once() {
        let fixture = fixture("Title_Commitment.pdf", DocumentKind::Other).await;

        let first = fixture.handler.handle(&upload_created()).await.expect("handle");
        assert_eq!(first.expect("output")["action"], "reclassified");
        let stored =
            fixture.uploads.find(&UploadId("upload-1".into())).await.expect("find").expect("upload");
        assert_eq!(stored.kind, DocumentKind::Title);

        let second = fixture.handler.handle(&upload_created()).await.expect("handle");
        assert_eq!(second.expect("output")["action"], "none");
    }

    #[tokio::test]
    async fn confident_disagreement_opens_a_single_review_task() {
        let fixture = fixture("ALTA_survey.pdf", DocumentKind::Legal).await;

        fixture.handler.handle(&upload_created()).await.expect("handle");
        let second = fixture.handler.handle(&upload_created()).await.expect("handle");
        assert_eq!(second.expect("output")["action"], "review_task_exists");

        let tasks = fixture.tasks.list_for_deal(&DealId("deal-1".into())).await.expect("list");
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].title.starts_with("[AUTO] Review classification"));
        assert_eq!(tasks[0].pipeline_step, 3);
    }

    #[tokio::test]
    async fn review_task_for_one_upload_does_not_cover_a_prefixed_id() {
        let fixture = fixture("ALTA_survey.pdf", DocumentKind::Legal).await;
        fixture
            .uploads
            .save(Upload {
                id: UploadId("upload-10".into()),
                org_id: OrgId("org-1".into()),
                deal_id: DealId("deal-1".into()),
                filename: "ALTA_survey.pdf".into(),
                kind: DocumentKind::Legal,
            })
            .await
            .expect("save upload");
        let upload_ten = DomainEvent::UploadCreated {
            deal_id: DealId("deal-1".into()),
            upload_id: UploadId("upload-10".into()),
            org_id: OrgId("org-1".into()),
        };

        let ten = fixture.handler.handle(&upload_ten).await.expect("handle");
        assert_eq!(ten.expect("output")["action"], "review_task_created");
        let one = fixture.handler.handle(&upload_created()).await.expect("handle");
        assert_eq!(one.expect("output")["action"], "review_task_created");

        let mut titles: Vec<String> = fixture
            .tasks
            .list_for_deal(&DealId("deal-1".into()))
            .await
            .expect("list")
            .into_iter()
            .map(|task| task.title)
            .collect();
        titles.sort();
        assert_eq!(
            titles,
            vec![
                "[AUTO] Review classification for upload upload-10: ALTA_survey.pdf",
                "[AUTO] Review classification for upload upload-1: ALTA_survey.pdf",
            ]
        );
    }

    #[tokio::test]
    async fn low_confidence_disagreement_is_ignored() {
        let fixture = fixture("memo to lender.pdf", DocumentKind::Financial).await;

        let output = fixture.handler.handle(&upload_created()).await.expect("handle");
        assert_eq!(output.expect("output")["action"], "none");
        let tasks = fixture.tasks.list_for_deal(&DealId("deal-1".into())).await.expect("list");
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn other_event_types_are_ignored() {
        let fixture = fixture("Title.pdf", DocumentKind::Other).await;
        let event = DomainEvent::ParcelCreated {
            deal_id: DealId("deal-1".into()),
            parcel_id: "parcel-1".into(),
            org_id: OrgId("org-1".into()),
        };
        assert_eq!(fixture.handler.handle(&event).await.expect("handle"), None);
    }
}
