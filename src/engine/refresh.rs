//! Per-patient refresh pipeline.
//!
//! Strict intra-patient order: variant resolution, then document
//! matching and frequency scheduling, then relevancy filtering. Every
//! (patient, base_name) recomputation yields one instance and one
//! immutable explanation. A computation failure poisons only its own
//! instance ("unresolved"); the rest of the patient proceeds.

use std::collections::HashMap;

use chrono::NaiveDate;
use chrono_tz::Tz;
use uuid::Uuid;

use crate::config::RunContext;
use crate::matching::fuzzy;
use crate::models::enums::{DataCategory, ScreeningStatus};
use crate::models::{
    Document, DocumentScore, ExplanationPayload, MatchExplanation, Organization,
    ResolutionOutcome, ScreeningInstance, ScreeningVariant, StatusDerivation,
};

use super::snapshot::{PatientSnapshot, VariantSnapshot};
use super::{dormancy, relevancy, resolver, schedule};

/// Recompute every screening for one patient. Pure with respect to
/// storage: all inputs arrive in the snapshots, all outputs go back to
/// the caller for an atomic write.
pub fn refresh_patient(
    ctx: &RunContext,
    org: &Organization,
    tz: Tz,
    variants: &VariantSnapshot,
    snapshot: &PatientSnapshot,
) -> (Vec<ScreeningInstance>, Vec<MatchExplanation>) {
    let existing: HashMap<&str, &ScreeningInstance> = snapshot
        .existing_instances
        .iter()
        .map(|i| (i.base_name.as_str(), i))
        .collect();

    let mut instances = Vec::new();
    let mut explanations = Vec::new();

    for base_name in variants.base_names() {
        // Dormancy gate: an appointment-driven dormant instance is
        // carried through untouched until local midnight after its
        // dormant-through date.
        if let Some(prior) = existing.get(base_name) {
            if dormancy::is_dormant(prior.dormant_through, tz, ctx.now) {
                tracing::debug!(
                    patient_id = %snapshot.patient.id,
                    base_name,
                    dormant_through = ?prior.dormant_through,
                    "Instance dormant, skipping evaluation"
                );
                instances.push((*prior).clone());
                continue;
            }
        }

        let (instance, explanation) = evaluate_base(ctx, org, base_name, variants, snapshot);
        instances.push(instance);
        explanations.push(explanation);
    }

    (instances, explanations)
}

fn evaluate_base(
    ctx: &RunContext,
    org: &Organization,
    base_name: &str,
    variants: &VariantSnapshot,
    snapshot: &PatientSnapshot,
) -> (ScreeningInstance, MatchExplanation) {
    let patient = &snapshot.patient;
    let candidates = variants.candidates(base_name);

    let resolution = resolver::resolve(
        candidates,
        patient.gender,
        patient.age_on(ctx.today),
        &patient.conditions,
    );

    let selected = resolution
        .selected
        .and_then(|id| candidates.iter().find(|v| v.id == id));

    let (instance, payload) = match selected {
        None => not_applicable(ctx, base_name, patient.id, resolution),
        Some(variant) => evaluate_selected(ctx, org, variant, snapshot, resolution),
    };

    let explanation = MatchExplanation {
        id: Uuid::new_v4(),
        patient_id: patient.id,
        base_name: base_name.to_string(),
        run_id: ctx.run_id,
        recorded_at: ctx.now.naive_utc(),
        payload,
    };

    let mut instance = instance;
    instance.explanation_id = Some(explanation.id);
    (instance, explanation)
}

/// No candidate survived: a valid outcome, surfaced distinctly rather
/// than silently omitted.
fn not_applicable(
    ctx: &RunContext,
    base_name: &str,
    patient_id: Uuid,
    resolution: ResolutionOutcome,
) -> (ScreeningInstance, ExplanationPayload) {
    let instance = ScreeningInstance {
        patient_id,
        base_name: base_name.to_string(),
        variant_id: None,
        status: ScreeningStatus::NotApplicable,
        last_completed_date: None,
        next_due_date: None,
        dormant_through: None,
        matched_documents: vec![],
        explanation_id: None,
        updated_at: ctx.now.naive_utc(),
    };
    let payload = ExplanationPayload {
        resolution,
        document_scores: vec![],
        derivation: None,
    };
    (instance, payload)
}

fn evaluate_selected(
    ctx: &RunContext,
    org: &Organization,
    variant: &ScreeningVariant,
    snapshot: &PatientSnapshot,
    resolution: ResolutionOutcome,
) -> (ScreeningInstance, ExplanationPayload) {
    let patient_id = snapshot.patient.id;
    let lab_cutoff = relevancy::data_category_cutoff(ctx.today, org.lab_currency_months);
    let vitals_cutoff = relevancy::data_category_cutoff(ctx.today, org.vitals_currency_months);

    // Score every document; the category-currency gate is evaluated
    // here, independently of the evidence cutoff applied below.
    let mut scored: Vec<ScoredDocument<'_>> = snapshot
        .documents
        .iter()
        .map(|doc| {
            let best = fuzzy::best_match(&doc.text, &variant.keywords);
            let category_current = match doc.doc_type.currency_category() {
                Some(DataCategory::Labs) => doc.service_date >= lab_cutoff,
                Some(DataCategory::Vitals) => doc.service_date >= vitals_cutoff,
                None => true,
            };
            let matched = best
                .as_ref()
                .map(|m| m.tier >= ctx.config.min_match_tier)
                .unwrap_or(false);
            ScoredDocument { doc, best, category_current, matched }
        })
        .collect();
    scored.sort_by(|a, b| a.doc.id.cmp(&b.doc.id));

    // Latest qualifying document marks the screening completed.
    let last_completed: Option<NaiveDate> = scored
        .iter()
        .filter(|s| s.matched && s.category_current)
        .map(|s| s.doc.service_date)
        .max();

    let (derived, evidence_cutoff) = match last_completed {
        None => {
            let derivation = StatusDerivation {
                last_completed_date: None,
                next_due_date: None,
                evidence_cutoff: None,
                lookahead_days: ctx.config.lookahead_days,
                status: ScreeningStatus::Due,
                failure: None,
            };
            (Ok(derivation), None)
        }
        Some(completed) => derive_schedule(ctx, variant, completed),
    };

    match derived {
        Ok(derivation) => {
            let matched_documents: Vec<Uuid> = scored
                .iter()
                .filter(|s| {
                    s.matched
                        && s.category_current
                        && evidence_cutoff
                            .map(|cutoff| relevancy::is_current_evidence(s.doc.service_date, cutoff))
                            .unwrap_or(true)
                })
                .map(|s| s.doc.id)
                .collect();

            let document_scores =
                document_scores(&scored, evidence_cutoff, &matched_documents);

            let instance = ScreeningInstance {
                patient_id,
                base_name: variant.base_name.clone(),
                variant_id: Some(variant.id),
                status: derivation.status,
                last_completed_date: derivation.last_completed_date,
                next_due_date: derivation.next_due_date,
                dormant_through: None,
                matched_documents,
                explanation_id: None,
                updated_at: ctx.now.naive_utc(),
            };
            let payload = ExplanationPayload {
                resolution,
                document_scores,
                derivation: Some(derivation),
            };
            (instance, payload)
        }
        Err(failure) => {
            // ComputationFailure: isolated to this instance; the batch
            // continues for every other screening and patient.
            tracing::warn!(
                patient_id = %patient_id,
                base_name = variant.base_name,
                error = %failure,
                "Schedule computation failed, marking instance unresolved"
            );
            let derivation = StatusDerivation {
                last_completed_date: last_completed,
                next_due_date: None,
                evidence_cutoff: None,
                lookahead_days: ctx.config.lookahead_days,
                status: ScreeningStatus::Unresolved,
                failure: Some(failure.to_string()),
            };
            let document_scores = document_scores(&scored, None, &[]);
            let instance = ScreeningInstance {
                patient_id,
                base_name: variant.base_name.clone(),
                variant_id: Some(variant.id),
                status: ScreeningStatus::Unresolved,
                last_completed_date: last_completed,
                next_due_date: None,
                dormant_through: None,
                matched_documents: vec![],
                explanation_id: None,
                updated_at: ctx.now.naive_utc(),
            };
            let payload = ExplanationPayload {
                resolution,
                document_scores,
                derivation: Some(derivation),
            };
            (instance, payload)
        }
    }
}

struct ScoredDocument<'a> {
    doc: &'a Document,
    best: Option<fuzzy::KeywordMatch>,
    category_current: bool,
    matched: bool,
}

fn derive_schedule(
    ctx: &RunContext,
    variant: &ScreeningVariant,
    completed: NaiveDate,
) -> (Result<StatusDerivation, schedule::ScheduleError>, Option<NaiveDate>) {
    let cutoff = match relevancy::evidence_cutoff(completed, &variant.frequency) {
        Ok(c) => c,
        Err(e) => return (Err(e), None),
    };
    let derived = schedule::status_on(
        Some(completed),
        &variant.frequency,
        ctx.today,
        ctx.config.lookahead_days,
    )
    .map(|(status, next_due)| StatusDerivation {
        last_completed_date: Some(completed),
        next_due_date: next_due,
        evidence_cutoff: Some(cutoff),
        lookahead_days: ctx.config.lookahead_days,
        status,
        failure: None,
    });
    (derived, Some(cutoff))
}

fn document_scores(
    scored: &[ScoredDocument<'_>],
    evidence_cutoff: Option<NaiveDate>,
    matched_documents: &[Uuid],
) -> Vec<DocumentScore> {
    scored
        .iter()
        .map(|s| DocumentScore {
            document_id: s.doc.id,
            service_date: s.doc.service_date,
            best_match: s.best.clone(),
            within_relevancy_window: evidence_cutoff
                .map(|cutoff| relevancy::is_current_evidence(s.doc.service_date, cutoff))
                .unwrap_or(true),
            within_category_currency: s.category_current,
            counted: matched_documents.contains(&s.doc.id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models::enums::{DocumentType, FrequencyUnit, Gender, VariantState};
    use crate::models::variant::{KeywordSet, KeywordTerm};
    use crate::models::{ConditionCode, Frequency, Patient};
    use chrono::{TimeZone, Utc};
    use chrono_tz::America::New_York;
    use std::collections::BTreeSet;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ctx(today: NaiveDate) -> RunContext {
        let now = Utc
            .from_utc_datetime(&today.and_hms_opt(12, 0, 0).unwrap());
        RunContext::at(EngineConfig::default(), now)
    }

    fn org() -> Organization {
        Organization {
            id: Uuid::new_v4(),
            name: "Clinic".into(),
            timezone: "America/New_York".into(),
            lab_currency_months: 12,
            vitals_currency_months: 12,
        }
    }

    fn patient(org_id: Uuid) -> Patient {
        Patient {
            id: Uuid::new_v4(),
            organization_id: org_id,
            emr_reference: None,
            birth_date: d(1972, 3, 1),
            gender: Gender::Female,
            conditions: BTreeSet::new(),
        }
    }

    fn mammogram_variant(freq: Frequency) -> ScreeningVariant {
        ScreeningVariant {
            id: Uuid::new_v4(),
            base_name: "Mammogram".into(),
            name: "Mammogram-General".into(),
            gender: None,
            age_min: Some(40),
            age_max: Some(74),
            trigger_conditions: BTreeSet::new(),
            frequency: freq,
            keywords: KeywordSet::new([KeywordTerm::new("mammogram", &[])]),
            state: VariantState::Active,
            created_at: d(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap(),
            archived_at: None,
        }
    }

    fn document(patient_id: Uuid, date: NaiveDate, text: &str) -> Document {
        Document {
            id: Uuid::new_v4(),
            patient_id,
            doc_type: DocumentType::RadiologyReport,
            service_date: date,
            text: text.into(),
            ingested_at: date.and_hms_opt(9, 0, 0).unwrap(),
        }
    }

    fn snapshot(patient: Patient, documents: Vec<Document>) -> PatientSnapshot {
        PatientSnapshot { patient, documents, existing_instances: vec![] }
    }

    #[test]
    fn matching_document_completes_the_screening() {
        let org = org();
        let p = patient(org.id);
        let variant = mammogram_variant(Frequency::new(2.0, FrequencyUnit::Years));
        let variants = VariantSnapshot::new(vec![variant.clone()], Utc::now());
        let doc = document(p.id, d(2024, 3, 15), "bilateral screening mammogram");
        let snap = snapshot(p, vec![doc.clone()]);

        let ctx = ctx(d(2024, 8, 1));
        let (instances, explanations) = refresh_patient(&ctx, &org, New_York, &variants, &snap);

        assert_eq!(instances.len(), 1);
        let inst = &instances[0];
        assert_eq!(inst.variant_id, Some(variant.id));
        assert_eq!(inst.status, ScreeningStatus::Compliant);
        assert_eq!(inst.last_completed_date, Some(d(2024, 3, 15)));
        assert_eq!(inst.next_due_date, Some(d(2026, 3, 15)));
        assert_eq!(inst.matched_documents, vec![doc.id]);

        assert_eq!(explanations.len(), 1);
        let payload = &explanations[0].payload;
        assert_eq!(payload.document_scores.len(), 1);
        assert!(payload.document_scores[0].counted);
        assert_eq!(inst.explanation_id, Some(explanations[0].id));
    }

    #[test]
    fn no_matching_document_means_due() {
        let org = org();
        let p = patient(org.id);
        let variants = VariantSnapshot::new(
            vec![mammogram_variant(Frequency::new(2.0, FrequencyUnit::Years))],
            Utc::now(),
        );
        let doc = document(p.id, d(2024, 3, 15), "lipid panel fasting");
        let snap = snapshot(p, vec![doc]);

        let (instances, _) = refresh_patient(&ctx(d(2024, 8, 1)), &org, New_York, &variants, &snap);
        assert_eq!(instances[0].status, ScreeningStatus::Due);
        assert!(instances[0].matched_documents.is_empty());
        assert_eq!(instances[0].next_due_date, None);
    }

    #[test]
    fn stale_document_excluded_despite_high_confidence_match() {
        let org = org();
        let p = patient(org.id);
        let variants = VariantSnapshot::new(
            vec![mammogram_variant(Frequency::new(2.0, FrequencyUnit::Years))],
            Utc::now(),
        );
        // Recent completion sets cutoff = 2022-03-15; the old document
        // is exactly one day before it.
        let recent = document(p.id, d(2024, 3, 15), "screening mammogram");
        let stale = document(p.id, d(2022, 3, 14), "screening mammogram");
        let snap = snapshot(p, vec![recent.clone(), stale.clone()]);

        let (instances, explanations) =
            refresh_patient(&ctx(d(2024, 8, 1)), &org, New_York, &variants, &snap);

        assert_eq!(instances[0].matched_documents, {
            let mut ids = vec![recent.id];
            ids.sort();
            ids
        });

        let scores = &explanations[0].payload.document_scores;
        let stale_score = scores.iter().find(|s| s.document_id == stale.id).unwrap();
        assert_eq!(stale_score.best_match.as_ref().unwrap().tier, fuzzy::ConfidenceTier::High);
        assert!(!stale_score.within_relevancy_window);
        assert!(!stale_score.counted);
    }

    #[test]
    fn boundary_document_at_cutoff_included() {
        let org = org();
        let p = patient(org.id);
        let variants = VariantSnapshot::new(
            vec![mammogram_variant(Frequency::new(2.0, FrequencyUnit::Years))],
            Utc::now(),
        );
        let recent = document(p.id, d(2024, 3, 15), "screening mammogram");
        let boundary = document(p.id, d(2022, 3, 15), "screening mammogram");
        let snap = snapshot(p, vec![recent.clone(), boundary.clone()]);

        let (instances, _) = refresh_patient(&ctx(d(2024, 8, 1)), &org, New_York, &variants, &snap);
        let mut expected = vec![recent.id, boundary.id];
        expected.sort();
        assert_eq!(instances[0].matched_documents, expected);
    }

    #[test]
    fn ineligible_patient_gets_not_applicable() {
        let org = org();
        let mut p = patient(org.id);
        p.birth_date = d(2000, 1, 1); // age 24, below the 40..=74 range
        let variants = VariantSnapshot::new(
            vec![mammogram_variant(Frequency::new(2.0, FrequencyUnit::Years))],
            Utc::now(),
        );
        let snap = snapshot(p, vec![]);

        let (instances, explanations) =
            refresh_patient(&ctx(d(2024, 8, 1)), &org, New_York, &variants, &snap);
        assert_eq!(instances[0].status, ScreeningStatus::NotApplicable);
        assert_eq!(instances[0].variant_id, None);
        assert_eq!(explanations[0].payload.resolution.selected, None);
        assert!(!explanations[0].payload.resolution.candidates.is_empty());
    }

    #[test]
    fn malformed_frequency_isolated_as_unresolved() {
        let org = org();
        let p = patient(org.id);
        // Bypasses definition-time validation, as corrupt stored data would.
        let broken = mammogram_variant(Frequency::new(0.0, FrequencyUnit::Years));
        let healthy = {
            let mut v = mammogram_variant(Frequency::new(2.0, FrequencyUnit::Years));
            v.base_name = "Colonoscopy".into();
            v.keywords = KeywordSet::new([KeywordTerm::new("colonoscopy", &[])]);
            v
        };
        let variants = VariantSnapshot::new(vec![broken, healthy], Utc::now());
        let docs = vec![
            document(p.id, d(2024, 3, 15), "screening mammogram"),
            document(p.id, d(2024, 2, 1), "colonoscopy to cecum"),
        ];
        let snap = snapshot(p, docs);

        let (instances, explanations) =
            refresh_patient(&ctx(d(2024, 8, 1)), &org, New_York, &variants, &snap);

        let mammogram = instances.iter().find(|i| i.base_name == "Mammogram").unwrap();
        assert_eq!(mammogram.status, ScreeningStatus::Unresolved);
        assert!(mammogram.matched_documents.is_empty());

        let colonoscopy = instances.iter().find(|i| i.base_name == "Colonoscopy").unwrap();
        assert_eq!(colonoscopy.status, ScreeningStatus::Compliant);

        let failed = explanations
            .iter()
            .find(|e| e.base_name == "Mammogram")
            .unwrap();
        let derivation = failed.payload.derivation.as_ref().unwrap();
        assert!(derivation.failure.is_some());
    }

    #[test]
    fn dormant_instance_carried_through_unchanged() {
        let org = org();
        let p = patient(org.id);
        let variants = VariantSnapshot::new(
            vec![mammogram_variant(Frequency::new(2.0, FrequencyUnit::Years))],
            Utc::now(),
        );
        let prior = ScreeningInstance {
            patient_id: p.id,
            base_name: "Mammogram".into(),
            variant_id: None,
            status: ScreeningStatus::Dormant,
            last_completed_date: None,
            next_due_date: None,
            dormant_through: Some(d(2024, 8, 10)),
            matched_documents: vec![],
            explanation_id: None,
            updated_at: d(2024, 7, 1).and_hms_opt(0, 0, 0).unwrap(),
        };
        let snap = PatientSnapshot {
            patient: p,
            documents: vec![],
            existing_instances: vec![prior.clone()],
        };

        // Run while still gated.
        let (instances, explanations) =
            refresh_patient(&ctx(d(2024, 8, 1)), &org, New_York, &variants, &snap);
        assert_eq!(instances[0].status, ScreeningStatus::Dormant);
        assert_eq!(instances[0].dormant_through, prior.dormant_through);
        assert!(explanations.is_empty());

        // Run after rollover: dormancy cleared, evaluation resumes.
        let (instances, explanations) =
            refresh_patient(&ctx(d(2024, 8, 12)), &org, New_York, &variants, &snap);
        assert_eq!(instances[0].status, ScreeningStatus::Due);
        assert_eq!(instances[0].dormant_through, None);
        assert_eq!(explanations.len(), 1);
    }

    #[test]
    fn stale_lab_blocked_by_category_currency_not_relevancy() {
        let org = org(); // lab currency 12 months
        let p = patient(org.id);
        let mut variant = mammogram_variant(Frequency::new(10.0, FrequencyUnit::Years));
        variant.base_name = "A1c".into();
        variant.keywords = KeywordSet::new([KeywordTerm::new("hemoglobin a1c", &[])]);
        let variants = VariantSnapshot::new(vec![variant], Utc::now());

        let mut old_lab = document(p.id, d(2022, 6, 1), "hemoglobin a1c 6.1 percent");
        old_lab.doc_type = DocumentType::LabResult;
        let snap = snapshot(p, vec![old_lab.clone()]);

        let (instances, explanations) =
            refresh_patient(&ctx(d(2024, 8, 1)), &org, New_York, &variants, &snap);

        // Ten-year frequency would accept it; the 12-month lab currency
        // cutoff rejects it independently.
        assert_eq!(instances[0].status, ScreeningStatus::Due);
        let score = &explanations[0].payload.document_scores[0];
        assert!(!score.within_category_currency);
        assert!(!score.counted);
    }
}
