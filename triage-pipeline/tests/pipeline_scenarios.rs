//! End-to-end controller scenarios over recording stage doubles.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use compliance::{build_legal_status, GateOutput, ReportedFile, WarrantStatus};
use triage_agent::backend::MockBackend;
use triage_agent::stage::mock::{CallRecorder, GateBehavior, StubGate, StubStage};
use triage_agent::stage::{ModelExtraction, ModelStage};
use triage_agent::{
    AuditEntry, AuditError, AuditSink, AuditStatus, Classification, DeconflictionMatch, EventBus,
    ExtractedEntities, ExtractionStage, HashMatch, HashMatchResults, HashSource, InMemoryAuditLog,
    MinorVictimStatus, NewAuditEntry, OffenseCategory, PriorityScore, PriorityTier, RawTip, RetryPolicy, Tip,
    TipLinks, TipSource, TipStatus,
};
use triage_pipeline::{steps, TriagePipeline};

const DOWNSTREAM: [&str; 5] = [
    steps::EXTRACTION,
    steps::HASH_OSINT,
    steps::CLASSIFIER,
    steps::LINKER,
    steps::PRIORITY,
];

const ALL_STEPS: [&str; 9] = [
    steps::INTAKE,
    steps::LEGAL_GATE,
    steps::EXTRACTION,
    steps::HASH_OSINT,
    steps::CLASSIFIER,
    steps::LINKER,
    steps::PRIORITY,
    steps::CRITICAL_OVERRIDE,
    steps::COMPLETE,
];

/// Knobs for one run; every field has a neutral default.
struct Scenario {
    files: Vec<ReportedFile>,
    gate: GateBehavior,
    hashes: HashMatchResults,
    classification: Classification,
    links: TipLinks,
    score: PriorityScore,
    score_degraded: Option<&'static str>,
    extraction_delay: Duration,
    linker_delay: Duration,
    /// Replaces the stub extraction stage
    extraction: Option<Arc<dyn ExtractionStage>>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            files: vec![
                ReportedFile::new("a").with_esp_viewed(true, false),
                ReportedFile::new("b").with_esp_viewed(false, false),
            ],
            gate: GateBehavior::Pass,
            hashes: HashMatchResults::default(),
            classification: Classification::new(OffenseCategory::Other),
            links: TipLinks::default(),
            score: PriorityScore::new(40),
            score_degraded: None,
            extraction_delay: Duration::ZERO,
            linker_delay: Duration::ZERO,
            extraction: None,
        }
    }
}

struct Harness {
    recorder: Arc<CallRecorder>,
    audit: Arc<InMemoryAuditLog>,
    bus: EventBus,
    pipeline: TriagePipeline,
}

impl Harness {
    fn new(scenario: Scenario) -> Self {
        Self::with_audit(scenario, Arc::new(InMemoryAuditLog::new()))
    }

    fn with_audit(scenario: Scenario, audit: Arc<InMemoryAuditLog>) -> Self {
        Self::build(scenario, audit.clone(), audit)
    }

    fn build(scenario: Scenario, audit: Arc<InMemoryAuditLog>, sink: Arc<dyn AuditSink>) -> Self {
        let recorder = CallRecorder::new();
        let bus = EventBus::new();

        let mut draft = Tip::new(TipSource::Ncmec, "").with_files(scenario.files).with_state("CA");
        draft.tip_id = "tip-1".to_string();

        let mut scorer = StubStage::new(steps::PRIORITY, scenario.score, recorder.clone());
        if let Some(reason) = scenario.score_degraded {
            scorer = scorer.degraded(reason);
        }

        let extraction: Arc<dyn ExtractionStage> = match scenario.extraction {
            Some(stage) => stage,
            None => Arc::new(
                StubStage::new(steps::EXTRACTION, ExtractedEntities::default(), recorder.clone())
                    .with_delay(scenario.extraction_delay),
            ),
        };

        let pipeline = TriagePipeline::builder()
            .pipeline_id("test")
            .intake(Arc::new(StubStage::new(steps::INTAKE, draft, recorder.clone())))
            .gate(Arc::new(StubGate::new(scenario.gate, recorder.clone())))
            .extraction(extraction)
            .hash_osint(Arc::new(StubStage::new(
                steps::HASH_OSINT,
                scenario.hashes,
                recorder.clone(),
            )))
            .classifier(Arc::new(StubStage::new(
                steps::CLASSIFIER,
                scenario.classification,
                recorder.clone(),
            )))
            .linker(Arc::new(
                StubStage::new(steps::LINKER, scenario.links, recorder.clone())
                    .with_delay(scenario.linker_delay),
            ))
            .scorer(Arc::new(scorer))
            .audit(sink)
            .events(Arc::new(bus.clone()))
            .build()
            .unwrap();

        Self {
            recorder,
            audit,
            bus,
            pipeline,
        }
    }

    async fn run(&self) -> Tip {
        self.pipeline
            .process_tip(RawTip::new(TipSource::Ncmec, "report body"))
            .await
    }
}

fn csam_minor() -> Classification {
    Classification::new(OffenseCategory::Csam).with_minor_victim(MinorVictimStatus::Confirmed)
}

fn active_conflict() -> TipLinks {
    TipLinks {
        deconfliction_matches: vec![DeconflictionMatch {
            agency: "HSI Los Angeles".to_string(),
            case_number: Some("HSI-2024-01".to_string()),
            active_investigation: true,
            contact: None,
        }],
        ..Default::default()
    }
}

#[tokio::test]
async fn gate_error_blocks_tip_and_skips_downstream() {
    let harness = Harness::new(Scenario {
        gate: GateBehavior::Fail("model endpoint down".to_string()),
        ..Default::default()
    });

    let tip = harness.run().await;

    assert_eq!(tip.status, TipStatus::Blocked);
    for stage in DOWNSTREAM {
        assert_eq!(harness.recorder.count(stage), 0, "{} should not run", stage);
    }
    assert!(tip.files.iter().all(|f| f.file_access_blocked && f.warrant_required));
    assert_eq!(tip.accessible_files().count(), 0);
    assert!(tip.priority.is_none());
    assert!(tip.triaged_at.is_some());

    let legal = tip.legal_status.unwrap();
    assert!(!legal.any_files_accessible);
    assert!(legal.legal_note.contains("model endpoint down"));
    assert!(legal.legal_note.contains("consult legal counsel."));

    let entries = harness.audit.for_tip("tip-1").await;
    let agents: Vec<&str> = entries.iter().map(|e| e.agent.as_str()).collect();
    assert_eq!(agents, vec![steps::INTAKE, steps::LEGAL_GATE]);
    assert_eq!(entries[1].status, AuditStatus::Blocked);
    assert!(entries[1].error_detail.as_deref().unwrap().contains("model endpoint down"));
}

#[tokio::test]
async fn gate_panic_is_caught_and_blocks() {
    let harness = Harness::new(Scenario {
        gate: GateBehavior::Panic("gate bug".to_string()),
        ..Default::default()
    });

    let tip = harness.run().await;

    assert_eq!(tip.status, TipStatus::Blocked);
    assert!(tip.files.iter().all(|f| f.file_access_blocked));
    for stage in DOWNSTREAM {
        assert_eq!(harness.recorder.count(stage), 0);
    }
}

#[tokio::test]
async fn blocked_path_emits_remaining_lifecycle_events() {
    let harness = Harness::new(Scenario {
        gate: GateBehavior::Fail("down".to_string()),
        ..Default::default()
    });
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = harness
        .bus
        .subscribe("*", move |e| sink.lock().unwrap().push(e.step.clone()));

    harness.run().await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![steps::INTAKE, steps::LEGAL_GATE, steps::COMPLETE]
    );
}

#[tokio::test]
async fn gate_self_block_keeps_warranted_file_out_of_extraction() {
    let mut warranted = ReportedFile::new("warranted-file")
        .with_esp_viewed(false, false)
        .with_warrant_status(WarrantStatus::Granted);
    warranted.filename = Some("warranted.jpg".to_string());

    let backend = Arc::new(MockBackend::default());
    let extraction = ModelExtraction::new(ModelStage::new(backend.clone()).with_retry(RetryPolicy::immediate(1)));
    let harness = Harness::new(Scenario {
        files: vec![warranted],
        gate: GateBehavior::SelfBlock("gate down".to_string()),
        extraction: Some(Arc::new(extraction)),
        ..Default::default()
    });

    let tip = harness.run().await;

    assert_eq!(tip.status, TipStatus::Triaged);
    assert_eq!(tip.files[0].warrant_status, WarrantStatus::Granted);
    assert!(tip.files[0].file_access_blocked);
    assert_eq!(tip.accessible_files().count(), 0);
    assert!(!tip.legal_status.unwrap().any_files_accessible);

    let requests = backend.requests();
    assert!(!requests.is_empty());
    for request in requests {
        assert!(!request.evidence.contains("warranted-file"));
        assert!(!request.evidence.contains("warranted.jpg"));
        assert!(request.evidence.contains("1 further file(s) are blocked"));
    }
}

#[tokio::test]
async fn gate_self_block_continues_with_all_files_blocked() {
    let harness = Harness::new(Scenario {
        gate: GateBehavior::SelfBlock("retries exhausted".to_string()),
        ..Default::default()
    });

    let tip = harness.run().await;

    assert_eq!(tip.status, TipStatus::Triaged);
    assert_eq!(tip.accessible_files().count(), 0);
    assert!(tip.files.iter().all(|f| f.file_access_blocked));
    assert_eq!(harness.recorder.count(steps::EXTRACTION), 1);

    let gate_entry = harness
        .audit
        .for_tip("tip-1")
        .await
        .into_iter()
        .find(|e| e.agent == steps::LEGAL_GATE)
        .unwrap();
    assert_eq!(gate_entry.status, AuditStatus::Degraded);
}

#[tokio::test]
async fn gate_proposal_cannot_unblock_files() {
    let mut lying = ReportedFile::new("b").with_esp_viewed(false, false);
    lying.warrant_required = false;
    lying.file_access_blocked = false;
    let proposal = GateOutput {
        legal_status: build_legal_status(&[], None),
        files: vec![ReportedFile::new("a").with_esp_viewed(true, false), lying],
    };

    let harness = Harness::new(Scenario {
        gate: GateBehavior::Propose(proposal),
        ..Default::default()
    });
    let tip = harness.run().await;

    let b = tip.files.iter().find(|f| f.file_id == "b").unwrap();
    assert!(b.warrant_required);
    assert!(b.file_access_blocked);
    let legal = tip.legal_status.unwrap();
    assert_eq!(legal.files_requiring_warrant, vec!["b".to_string()]);
    assert!(legal.legal_note.contains("1 of 2 file(s) accessible"));
}

#[tokio::test]
async fn gate_proposal_cannot_grant_warrants() {
    let proposal = GateOutput {
        legal_status: build_legal_status(&[], None),
        files: vec![ReportedFile::new("b")
            .with_esp_viewed(false, false)
            .with_warrant_status(WarrantStatus::Granted)],
    };
    let harness = Harness::new(Scenario {
        files: vec![ReportedFile::new("b")
            .with_esp_viewed(false, false)
            .with_warrant_status(WarrantStatus::Applied)],
        gate: GateBehavior::Propose(proposal),
        ..Default::default()
    });

    let tip = harness.run().await;

    assert_eq!(tip.files[0].warrant_status, WarrantStatus::Applied);
    assert!(tip.files[0].file_access_blocked);
}

#[tokio::test]
async fn hash_match_on_blocked_file_adds_probable_cause() {
    let harness = Harness::new(Scenario {
        hashes: HashMatchResults {
            matches: vec![HashMatch {
                file_id: "b".to_string(),
                hash: "abc123".to_string(),
                source: HashSource::Ncmec,
                category: Some("A1".to_string()),
            }],
            ..Default::default()
        },
        ..Default::default()
    });

    let tip = harness.run().await;

    let b = tip.files.iter().find(|f| f.file_id == "b").unwrap();
    assert!(b.hash_match);
    assert!(b.file_access_blocked);
    assert!(tip.legal_status.unwrap().legal_note.contains("probable cause"));
}

#[tokio::test]
async fn csam_minor_floor_from_low_score() {
    let harness = Harness::new(Scenario {
        classification: csam_minor(),
        score: PriorityScore::new(10),
        ..Default::default()
    });

    let tip = harness.run().await;

    let priority = tip.priority.unwrap();
    assert!(priority.score >= 95);
    assert_eq!(priority.tier, PriorityTier::Immediate);
    assert_eq!(tip.status, TipStatus::Triaged);
}

#[tokio::test]
async fn sextortion_crisis_floor() {
    let harness = Harness::new(Scenario {
        classification: Classification::new(OffenseCategory::Sextortion).with_crisis(true),
        score: PriorityScore::new(35),
        ..Default::default()
    });

    let priority = harness.run().await.priority.unwrap();

    assert!(priority.score >= 90);
    assert_eq!(priority.tier, PriorityTier::Immediate);
    assert!(priority.victim_crisis_alert);
}

#[tokio::test]
async fn active_deconfliction_pauses_over_csam_floor() {
    let harness = Harness::new(Scenario {
        classification: csam_minor(),
        links: active_conflict(),
        score: PriorityScore::new(100),
        ..Default::default()
    });

    let priority = harness.run().await.priority.unwrap();

    assert_eq!(priority.tier, PriorityTier::Paused);
    assert!(priority.supervisor_alert);
    assert!(priority
        .supervisor_alert_reason
        .unwrap()
        .contains("HSI Los Angeles"));
}

#[tokio::test]
async fn aig_flag_never_lowers_final_score() {
    for base in [csam_minor(), Classification::new(OffenseCategory::Csam)] {
        for score in [0u8, 50, 99] {
            let without = Harness::new(Scenario {
                classification: base.clone().with_aig_flag(false),
                score: PriorityScore::new(score),
                ..Default::default()
            })
            .run()
            .await;
            let with = Harness::new(Scenario {
                classification: base.clone().with_aig_flag(true),
                score: PriorityScore::new(score),
                ..Default::default()
            })
            .run()
            .await;

            assert!(with.priority.unwrap().score >= without.priority.unwrap().score);
        }
    }
}

#[tokio::test]
async fn scoring_fallback_is_urgent_and_audited_as_degraded() {
    let harness = Harness::new(Scenario {
        score: PriorityScore::fallback("backend down"),
        score_degraded: Some("backend down"),
        ..Default::default()
    });

    let tip = harness.run().await;

    let priority = tip.priority.unwrap();
    assert_eq!(priority.tier, PriorityTier::Urgent);
    assert!(priority.supervisor_alert);

    let entry = harness
        .audit
        .for_tip("tip-1")
        .await
        .into_iter()
        .find(|e| e.agent == steps::PRIORITY)
        .unwrap();
    assert_eq!(entry.status, AuditStatus::Degraded);
    assert_eq!(entry.error_detail.as_deref(), Some("backend down"));
}

#[tokio::test]
async fn stages_respect_join_barriers() {
    let harness = Harness::new(Scenario {
        extraction_delay: Duration::from_millis(30),
        linker_delay: Duration::from_millis(30),
        ..Default::default()
    });

    harness.run().await;

    let pos = |event: &str| {
        harness
            .recorder
            .position(event)
            .unwrap_or_else(|| panic!("{} not recorded", event))
    };

    assert!(pos("legal_gate:start") > pos("intake:end"));
    assert!(pos("extraction:start") > pos("legal_gate:end"));
    assert!(pos("hash_osint:start") > pos("legal_gate:end"));
    // Both halves of the first fan-out are in flight together.
    assert!(pos("hash_osint:start") < pos("extraction:end"));

    for second in ["classifier:start", "linker:start"] {
        assert!(pos(second) > pos("extraction:end"));
        assert!(pos(second) > pos("hash_osint:end"));
    }

    assert!(pos("priority:start") > pos("classifier:end"));
    assert!(pos("priority:start") > pos("linker:end"));
}

#[tokio::test]
async fn audit_has_one_entry_per_stage_in_order() {
    let harness = Harness::new(Scenario::default());

    harness.run().await;

    let entries = harness.audit.for_tip("tip-1").await;
    let agents: Vec<&str> = entries.iter().map(|e| e.agent.as_str()).collect();
    assert_eq!(agents, ALL_STEPS.to_vec());
    assert!(entries.iter().all(|e| e.status == AuditStatus::Success));
    tokio_test::assert_ok!(harness.audit.verify_chain().await);
}

#[tokio::test]
async fn events_follow_stage_order() {
    let harness = Harness::new(Scenario::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = harness
        .bus
        .subscribe("*", move |e| sink.lock().unwrap().push(e.step.clone()));
    let completes = Arc::new(Mutex::new(Vec::new()));
    let complete_sink = Arc::clone(&completes);
    let _complete = harness.bus.subscribe(steps::COMPLETE, move |e| {
        complete_sink.lock().unwrap().push(e.payload["status"].clone())
    });

    harness.run().await;

    assert_eq!(*seen.lock().unwrap(), ALL_STEPS.to_vec());
    assert_eq!(*completes.lock().unwrap(), vec![serde_json::json!("triaged")]);
}

struct FailingAudit;

#[async_trait]
impl AuditSink for FailingAudit {
    async fn append(&self, _entry: NewAuditEntry) -> Result<AuditEntry, AuditError> {
        Err(AuditError::Unavailable("disk full".to_string()))
    }

    async fn for_tip(&self, _tip_id: &str) -> Vec<AuditEntry> {
        Vec::new()
    }
}

#[tokio::test]
async fn audit_failure_does_not_abort_run() {
    let harness = Harness::build(
        Scenario {
            classification: csam_minor(),
            score: PriorityScore::new(10),
            ..Default::default()
        },
        Arc::new(InMemoryAuditLog::new()),
        Arc::new(FailingAudit),
    );

    let tip = harness.run().await;

    assert_eq!(tip.status, TipStatus::Triaged);
    assert_eq!(tip.priority.unwrap().score, 95);
}

#[tokio::test]
async fn concurrent_runs_share_one_pipeline() {
    let audit = Arc::new(InMemoryAuditLog::new());
    let harness = Harness::with_audit(Scenario::default(), audit.clone());

    let (first, second) = tokio::join!(harness.run(), harness.run());

    assert_eq!(first.status, TipStatus::Triaged);
    assert_eq!(second.status, TipStatus::Triaged);
    assert_eq!(audit.count().await, 18);
    tokio_test::assert_ok!(audit.verify_chain().await);
}
