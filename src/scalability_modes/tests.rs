use super::*;

#[test]
fn parse_scalability_modes() {
    let scalability_mode: ScalabilityMode = "L1T3".parse().unwrap();
    assert_eq!(scalability_mode.spatial_layers().get(), 1);
    assert_eq!(scalability_mode.temporal_layers().get(), 3);
    assert!(!scalability_mode.ksvc());

    let scalability_mode: ScalabilityMode = "L3T2_KEY".parse().unwrap();
    assert_eq!(scalability_mode.spatial_layers().get(), 3);
    assert_eq!(scalability_mode.temporal_layers().get(), 2);
    assert!(scalability_mode.ksvc());

    let scalability_mode: ScalabilityMode = "S2T3".parse().unwrap();
    assert_eq!(scalability_mode.spatial_layers().get(), 2);
    assert_eq!(scalability_mode.temporal_layers().get(), 3);

    for bad in ["foo", "ull", "S0T3", "S1T0", "L1T3_KEY_FOO", "l1t3"] {
        assert_eq!(
            bad.parse::<ScalabilityMode>(),
            Err(ParseScalabilityModeError::InvalidInput),
            "{}",
            bad
        );
    }
}

#[test]
fn display_keeps_original_form() {
    for mode in ["L1T3", "S3T3", "L2T2_KEY", "L3T3_KEY_SHIFT"] {
        assert_eq!(mode.parse::<ScalabilityMode>().unwrap().to_string(), mode);
    }

    let mode = ScalabilityMode::simulcast(NonZeroU8::new(3).unwrap(), NonZeroU8::new(2).unwrap());
    assert_eq!(mode.to_string(), "S3T2");
    assert_eq!(serde_json::to_string(&mode).unwrap(), r#""S3T2""#);
}
