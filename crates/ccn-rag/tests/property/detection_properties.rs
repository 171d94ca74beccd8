use ccn_rag::rag::PreDetector;
use ccn_rag::{AgreementId, Intent};
use proptest::prelude::*;

proptest! {
    #[test]
    fn agreement_ids_are_four_digits(n in 0u32..10_000) {
        let id = AgreementId::parse(&n.to_string()).unwrap();
        prop_assert_eq!(id.as_str().len(), 4);
        prop_assert_eq!(id.as_str(), format!("{:04}", n));
        prop_assert_eq!(Some(id.clone()), AgreementId::parse(id.as_str()));
    }

    #[test]
    fn longer_codes_are_rejected(n in 10_000u32..10_000_000) {
        prop_assert!(AgreementId::parse(&n.to_string()).is_none());
    }

    #[test]
    fn keyword_identifier_is_detected(
        n in 100u32..10_000,
        keyword in prop::sample::select(vec!["idcc", "IDCC", "ccn", "CCN", "idcc:", "ccn n°"]),
    ) {
        let query = format!("Quelle est la période d'essai {} {} ?", keyword, n);
        let c = PreDetector::default().detect(&query).unwrap();
        prop_assert_eq!(c.intent, Intent::CcnSearch);
        let id = c.agreement_id.unwrap();
        prop_assert_eq!(id.as_str(), format!("{:04}", n));
        prop_assert!((c.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn bare_four_digit_token_is_the_identifier(n in 0u32..10_000) {
        let token = format!("{:04}", n);
        let query = format!("indemnité de licenciement convention {} cadres", token);
        let c = PreDetector::default().detect(&query).unwrap();
        let id = c.agreement_id.unwrap();
        prop_assert_eq!(id.as_str(), token.as_str());
    }

    #[test]
    fn detection_is_deterministic(s in "[a-zà-ü0-9 ,'?]{0,80}") {
        let detector = PreDetector::default();
        prop_assert_eq!(detector.detect(&s), detector.detect(&s));
    }

    #[test]
    fn short_greeting_with_trailing_words_is_general(
        greeting in prop::sample::select(vec!["bonjour", "Bonsoir", "salut", "merci", "Merci", "au revoir", "bonne journée", "hello"]),
        tail in prop::collection::vec(
            prop::sample::select(vec!["beaucoup", "à", "vous", "tous", "ça", "va", "encore", "pour", "tout", "madame"]),
            0..=4,
        ),
    ) {
        let query = format!("{} {}", greeting, tail.join(" "));
        let c = PreDetector::default().detect(&query).unwrap();
        prop_assert_eq!(c.intent, Intent::GeneralQuestion);
        prop_assert_eq!(c.confidence, 1.0);
        prop_assert!(c.agreement_id.is_none());
    }

    #[test]
    fn amounts_are_not_identifiers(
        n in 1000u32..10_000,
        unit in prop::sample::select(vec!["euros", "€", "EUR", "heures", "h", "%", "jours"]),
    ) {
        let query = format!("la prime de {} {} est-elle due ?", n, unit);
        prop_assert!(PreDetector::default().detect(&query).is_none());
    }
}
