//! Key Derivation Tests
//!
//! ## Test Scopes
//! - **Deriver**: full, partial and failed key sets; determinism; shard range.
//! - **Geohash**: known encodings and round trips through the cell centre.
//! - **Normalisation**: styles, names and handles.

#[cfg(test)]
mod tests {
    use crate::discovery::types::{CandidateEntity, Source};
    use crate::keys::geohash;
    use crate::keys::normalize::{
        is_known_style, normalize_handle, normalize_name, normalize_style, STYLE_VOCABULARY,
    };
    use crate::keys::shard::bucket_for;
    use crate::keys::types::entity_id_from_pk;
    use crate::keys::{KeyDerivationError, KeyDeriver, KeyIssue, METADATA_SK};
    use chrono::Utc;
    use std::collections::HashSet;

    fn entity(id: &str) -> CandidateEntity {
        CandidateEntity {
            entity_id: id.to_string(),
            name: "Inkwell Tattoo".to_string(),
            studio_name: None,
            source: Source::MapApi,
            location: "london".to_string(),
            styles: vec!["Traditional".to_string()],
            geohash: Some("gcpvj0".to_string()),
            latitude: Some(51.5074),
            longitude: Some(-0.1278),
            handle: Some("@InkWell".to_string()),
            confidence: 0.9,
            discovered_at: Utc::now(),
        }
    }

    // ============================================================
    // TEST 1: Full Key Sets
    // ============================================================

    #[test]
    fn test_full_key_set() {
        // ARRANGE
        let deriver = KeyDeriver::new(10);

        // ACT
        let keys = deriver.derive(&entity("artist-1")).unwrap();

        // ASSERT
        assert_eq!(keys.pk, "ENTITY#artist-1");
        assert_eq!(keys.sk, METADATA_SK);
        let shard = bucket_for("artist-1", 10);
        assert_eq!(
            keys.gsi1pk.as_deref(),
            Some(format!("STYLE#traditional#SHARD#{}", shard).as_str())
        );
        assert_eq!(keys.gsi1sk.as_deref(), Some("GEOHASH#gcpvj0#ENTITY#artist-1"));
        assert_eq!(keys.gsi2pk.as_deref(), Some("NAME#inkwell-tattoo"));
        assert_eq!(keys.gsi2sk.as_deref(), Some("ENTITY#artist-1"));
        assert_eq!(keys.gsi3pk.as_deref(), Some("HANDLE#inkwell"));
        assert_eq!(keys.secondary_count(), 3);
        assert_eq!(entity_id_from_pk(&keys.pk), Some("artist-1"));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = KeyDeriver::new(10).derive(&entity("artist-7")).unwrap();
        let b = KeyDeriver::new(10).derive(&entity("artist-7")).unwrap();

        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_absent_optional_attributes_leave_keys_unset() {
        // ARRANGE: no style and no handle is not an error
        let mut candidate = entity("artist-2");
        candidate.styles.clear();
        candidate.handle = None;

        // ACT
        let keys = KeyDeriver::new(10).derive(&candidate).unwrap();

        // ASSERT
        assert!(keys.gsi1pk.is_none());
        assert!(keys.gsi1sk.is_none());
        assert!(keys.gsi3pk.is_none());
        assert!(keys.gsi2pk.is_some());

        let json = serde_json::to_value(&keys).unwrap();
        assert!(json.get("gsi1pk").is_none());
        assert_eq!(json["PK"], "ENTITY#artist-2");
    }

    // ============================================================
    // TEST 2: Partial and Failed Derivation
    // ============================================================

    #[test]
    fn test_style_without_geohash_is_partial() {
        // ARRANGE
        let mut candidate = entity("artist-3");
        candidate.geohash = None;

        // ACT
        let err = KeyDeriver::new(10).derive(&candidate).unwrap_err();

        // ASSERT: GSI1 dropped, other keys kept
        match err {
            KeyDerivationError::Partial { keys, issues } => {
                assert_eq!(issues, vec![KeyIssue::MissingGeohash]);
                assert!(keys.gsi1pk.is_none());
                assert_eq!(keys.gsi2pk.as_deref(), Some("NAME#inkwell-tattoo"));
                assert_eq!(keys.gsi3pk.as_deref(), Some("HANDLE#inkwell"));
            }
            other => panic!("expected partial key set, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_geohash_and_unusable_name_are_both_reported() {
        let mut candidate = entity("artist-4");
        candidate.geohash = Some("gcp!a".to_string());
        candidate.name = "!!!".to_string();

        let (keys, issues) = KeyDeriver::new(10).derive_flagged(&candidate).unwrap();

        assert_eq!(
            issues,
            vec![
                KeyIssue::InvalidGeohash("gcp!a".to_string()),
                KeyIssue::UnusableName("!!!".to_string()),
            ]
        );
        assert_eq!(keys.secondary_count(), 1);
    }

    #[test]
    fn test_missing_entity_id_is_fatal() {
        let candidate = entity("   ");

        assert_eq!(
            KeyDeriver::new(10).derive(&candidate).unwrap_err(),
            KeyDerivationError::MissingEntityId
        );
        assert!(KeyDeriver::new(10).derive_flagged(&candidate).is_err());
    }

    // ============================================================
    // TEST 3: Write Sharding
    // ============================================================

    #[test]
    fn test_shards_stay_in_range_and_spread() {
        // ARRANGE
        let deriver = KeyDeriver::new(10);
        let mut shards = HashSet::new();

        // ACT
        for i in 0..200 {
            let id = format!("google_maps-studio-{}", i);
            let shard = bucket_for(&id, deriver.shard_count());
            assert!(shard < 10);
            shards.insert(shard);
        }

        // ASSERT
        assert!(shards.len() > 1);
    }

    #[test]
    fn test_zero_shard_count_is_clamped() {
        let deriver = KeyDeriver::new(0);
        let keys = deriver.derive(&entity("artist-5")).unwrap();

        assert_eq!(deriver.shard_count(), 1);
        assert_eq!(keys.gsi1pk.as_deref(), Some("STYLE#traditional#SHARD#0"));
    }

    // ============================================================
    // TEST 4: Geohash
    // ============================================================

    #[test]
    fn test_geohash_known_values() {
        assert_eq!(geohash::encode(51.5074, -0.1278, 6).as_deref(), Some("gcpvj0"));
        assert_eq!(geohash::encode(53.4808, -2.2426, 6).as_deref(), Some("gcw2hz"));
        assert_eq!(
            geohash::encode(57.64911, 10.40744, 11).as_deref(),
            Some("u4pruydqqvj")
        );
    }

    #[test]
    fn test_geohash_decode_returns_cell_centre() {
        let (lat, lon) = geohash::decode("gcpvj0").unwrap();

        assert!((lat - 51.50665283203125).abs() < 1e-9);
        assert!((lon - -0.1263427734375).abs() < 1e-9);
        assert_eq!(geohash::encode(lat, lon, 6).as_deref(), Some("gcpvj0"));
    }

    #[test]
    fn test_geohash_rejects_bad_input() {
        assert!(geohash::encode(91.0, 0.0, 6).is_none());
        assert!(geohash::encode(0.0, 0.0, 0).is_none());
        assert!(geohash::encode(0.0, 0.0, 13).is_none());
        assert!(!geohash::is_valid("abc"));
        assert!(!geohash::is_valid(""));
        assert!(geohash::decode("gcpvja").is_none());
        assert!(geohash::is_valid("GCPVJ0"));
    }

    // ============================================================
    // TEST 5: Normalisation
    // ============================================================

    #[test]
    fn test_style_normalisation() {
        assert_eq!(normalize_style("Fine Line"), "fineline");
        assert_eq!(normalize_style("Neo-Traditional"), "neo_traditional");
        assert_eq!(normalize_style("watercolor"), "watercolour");
        assert_eq!(normalize_style("  Trash  Polka "), "trash_polka");
        assert_eq!(normalize_style("cyber sigilism"), "cyber_sigilism");
        assert_eq!(normalize_style(" - "), "");

        assert!(is_known_style("trash_polka"));
        assert!(!is_known_style("cyber_sigilism"));
        assert!(STYLE_VOCABULARY.iter().all(|s| normalize_style(s) == *s));
    }

    #[test]
    fn test_name_normalisation() {
        assert_eq!(normalize_name("Café Noir  Tattoo!"), "cafe-noir-tattoo");
        assert_eq!(normalize_name("  --Ink & Iron-- "), "ink-iron");
        assert_eq!(normalize_name("Zoë's Studio"), "zoe-s-studio");
        assert_eq!(normalize_name("***"), "");
    }

    #[test]
    fn test_handle_normalisation() {
        assert_eq!(normalize_handle("@InkWell"), "inkwell");
        assert_eq!(normalize_handle("https://instagram.com/InkWell/"), "inkwell");
        assert_eq!(normalize_handle("https://instagram.com/InkWell/?hl=en"), "inkwell");
        assert_eq!(normalize_handle("instagram.com/ink.well?igsh=abc"), "ink.well");
        assert_eq!(normalize_handle("@"), "");
    }
}
