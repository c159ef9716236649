use super::*;

#[test]
fn dtls_fingerprint() {
    let dtls_fingerprints = &[
        r#"{"algorithm":"sha-1","value":"0D:88:5B:EF:B9:86:F9:66:67:75:7A:C1:7A:78:34:E4:88:DC:44:67"}"#,
        r#"{"algorithm":"sha-224","value":"6E:0C:C7:23:DF:36:E1:C7:46:AB:D7:B1:CE:DD:97:C3:C1:17:25:D6:26:0A:8A:B4:50:F1:3E:BC"}"#,
        r#"{"algorithm":"sha-256","value":"7A:27:46:F0:7B:09:28:F0:10:E2:EC:84:60:B5:87:9A:D9:C8:8B:F3:6C:C5:5D:C3:F3:BA:2C:5B:4F:8A:3A:E3"}"#,
    ];

    for dtls_fingerprint_str in dtls_fingerprints {
        let dtls_fingerprint =
            serde_json::from_str::<DtlsFingerprint>(dtls_fingerprint_str).unwrap();
        assert_eq!(
            dtls_fingerprint_str,
            &serde_json::to_string(&dtls_fingerprint).unwrap()
        );
    }

    let bad_dtls_fingerprints = &[
        r#"{"algorithm":"sha-1","value":"0D:88:5B:EF:B9:86:F9:66:67::44:67"}"#,
        r#"{"algorithm":"sha-200","value":"6E:0C:C7:23:DF:36:E1:C7:46:AB:D7:B1:CE:DD:97:C3:C1:17:25:D6:26:0A:8A:B4:50:F1:3E:BC"}"#,
        r#"{"algorithm":"sha-1","value":"ZZ:88:5B:EF:B9:86:F9:66:67:75:7A:C1:7A:78:34:E4:88:DC:44:67"}"#,
    ];

    for dtls_fingerprint_str in bad_dtls_fingerprints {
        assert!(serde_json::from_str::<DtlsFingerprint>(dtls_fingerprint_str).is_err());
    }
}

#[test]
fn sequential_ids() {
    let generator = SequentialIdGenerator::starting_at(7);

    assert_eq!(generator.generate(), Uuid::from_u128(7));
    assert_eq!(generator.generate(), Uuid::from_u128(8));
    assert_ne!(RandomIdGenerator.generate(), RandomIdGenerator.generate());
}

#[test]
fn transport_tuple_without_remote() {
    let tuple: TransportTuple =
        serde_json::from_str(r#"{"localIp":"127.0.0.1","localPort":40000,"protocol":"udp"}"#)
            .unwrap();

    assert_eq!(tuple.local_port, 40000);
    assert_eq!(tuple.remote_ip, None);
    assert_eq!(tuple.protocol, TransportProtocol::Udp);
}
