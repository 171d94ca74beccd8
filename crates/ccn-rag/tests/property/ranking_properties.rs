use ccn_rag::reranking::rank_passages;
use ccn_rag::{AgreementId, Passage};
use proptest::prelude::*;

const LABELS: &[&str] = &[
    "ARRETE",
    "Arrêté d'extension",
    "AVENANT",
    "ACCORD_SALAIRES",
    "Accord de prévoyance",
    "ACCORD",
    "TEXTE_BASE",
    "ANNEXE",
    "circulaire",
    "",
];

fn passages(specs: &[(usize, f32)]) -> Vec<Passage> {
    let idcc = AgreementId::parse("1979").unwrap();
    specs
        .iter()
        .enumerate()
        .map(|(i, (label, score))| Passage {
            id: format!("p{}", i),
            agreement_id: idcc.clone(),
            document_type: LABELS[*label].to_string(),
            text: String::new(),
            relevance_score: *score,
            source_label: String::new(),
        })
        .collect()
}

fn specs() -> impl Strategy<Value = Vec<(usize, f32)>> {
    prop::collection::vec((0..LABELS.len(), 0.0f32..1.0), 0..40)
}

proptest! {
    #[test]
    fn tiers_never_decrease(specs in specs()) {
        let ranked = rank_passages(passages(&specs));
        let tiers: Vec<u8> = ranked.iter().map(|p| p.tier).collect();
        prop_assert!(tiers.windows(2).all(|w| w[0] <= w[1]), "tiers out of order: {:?}", tiers);
    }

    #[test]
    fn scores_never_increase_within_a_tier(specs in specs()) {
        let ranked = rank_passages(passages(&specs));
        for w in ranked.passages().windows(2) {
            if w[0].tier == w[1].tier {
                prop_assert!(w[0].passage.relevance_score >= w[1].passage.relevance_score);
            }
        }
    }

    #[test]
    fn ranking_keeps_every_passage(specs in specs()) {
        let input = passages(&specs);
        let ranked = rank_passages(input.clone());
        prop_assert_eq!(ranked.len(), input.len());
        let mut in_ids: Vec<_> = input.iter().map(|p| p.id.clone()).collect();
        let mut out_ids: Vec<_> = ranked.iter().map(|p| p.passage.id.clone()).collect();
        in_ids.sort();
        out_ids.sort();
        prop_assert_eq!(in_ids, out_ids);
    }

    #[test]
    fn ranking_is_deterministic(specs in specs()) {
        let first = rank_passages(passages(&specs));
        let second = rank_passages(passages(&specs));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn tier_labels_follow_tiers(specs in specs()) {
        let ranked = rank_passages(passages(&specs));
        for p in ranked.iter() {
            prop_assert_eq!(p.tier_label.as_str(), ccn_rag::reranking::tier_label(p.tier));
        }
    }
}
