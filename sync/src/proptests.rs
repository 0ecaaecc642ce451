#[cfg(test)]
mod proptests {
    use crate::reconcile::reconcile;
    use crate::similarity::dice;
    use crate::urlnorm::canonical_url;
    use chrono::{TimeZone, Utc};
    use config::MatchConfig;
    use proptest::prelude::*;
    use st_core::types::{StageRecord, StageStatus};

    fn arb_record() -> impl Strategy<Value = StageRecord> {
        (
            "[a-z0-9]{1,12}",
            "[A-Za-z ]{0,24}",
            "[A-Za-z ]{0,16}",
            prop::option::of("[a-z]{3,10}"),
        )
            .prop_map(|(id, title, company, url_slug)| {
                let t = Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap();
                StageRecord {
                    id,
                    title,
                    company,
                    url: url_slug.map(|s| format!("https://jobs.example/{s}")).unwrap_or_default(),
                    location: String::new(),
                    notes: String::new(),
                    status: StageStatus::Open,
                    deadline: None,
                    source: None,
                    created_at: t,
                    updated_at: t
                }
            })
    }

    proptest! {
        #[test]
        fn test_reconcile_idempotent(
            local in prop::collection::vec(arb_record(), 0..6),
            remote in prop::collection::vec(arb_record(), 0..6)
        ) {
            let config = MatchConfig::default();
            let now = Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap();

            let once = reconcile(&local, &remote, &config, now);
            let twice = reconcile(&once, &remote, &config, now);
            prop_assert_eq!(&once, &twice);
        }

        #[test]
        fn test_reconcile_never_grows_past_inputs(
            local in prop::collection::vec(arb_record(), 0..6),
            remote in prop::collection::vec(arb_record(), 0..6)
        ) {
            let config = MatchConfig::default();
            let now = Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap();

            let merged = reconcile(&local, &remote, &config, now);
            prop_assert!(merged.len() <= local.len() + remote.len());
        }

        #[test]
        fn test_dice_symmetric_and_bounded(a in "\\PC{0,24}", b in "\\PC{0,24}") {
            let ab = dice(&a, &b);
            let ba = dice(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-9);
            prop_assert!((0.0..=1.0).contains(&ab));
        }

        #[test]
        fn test_canonical_url_idempotent(slug in "[a-z/]{0,20}", tracking in prop::bool::ANY) {
            let raw = if tracking {
                format!("https://jobs.example/{slug}?utm_source=feed")
            } else {
                format!("https://jobs.example/{slug}")
            };
            if let Some(canonical) = canonical_url(&raw) {
                let again = canonical_url(&canonical);
                prop_assert_eq!(again, Some(canonical));
            }
        }
    }
}
