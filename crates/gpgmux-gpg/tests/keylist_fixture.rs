//! Parses a checked-in `--with-colons` public keyring listing.

use chrono::{TimeZone, Utc};
use gpgmux_gpg::{parse_keylist, KeyKind, Validity};

const FIXTURE: &str = include_str!("fixtures/pubring.colons");

#[test]
fn test_fixture_key_count_and_order() {
    let keys = parse_keylist(FIXTURE).unwrap();
    let ids: Vec<&str> = keys.iter().map(|k| k.key_id.as_str()).collect();
    assert_eq!(ids, ["1A2B3C4D5E6F7081", "0011223344556677", "DEADBEEFCAFEBABE"]);
    assert!(keys.iter().all(|k| k.kind == KeyKind::Public));
}

#[test]
fn test_fixture_ultimate_ed25519_key() {
    let keys = parse_keylist(FIXTURE).unwrap();
    let alice = &keys[0];

    assert_eq!(alice.validity, Validity::Ultimate);
    assert_eq!((alice.length, alice.algorithm), (255, 22));
    assert_eq!(alice.created, Utc.timestamp_opt(1_700_000_000, 0).unwrap());
    assert_eq!(alice.expires, None);
    assert_eq!(
        alice.fingerprint.as_deref(),
        Some("0123456789ABCDEF012345671A2B3C4D5E6F7081")
    );

    let caps = alice.capabilities;
    assert!(caps.own.sign && caps.own.certify && !caps.own.encrypt);
    assert!(caps.usable.encrypt && caps.usable.sign && caps.usable.certify);
    assert!(!caps.usable.authenticate && !caps.disabled);

    assert_eq!(alice.display_name(), Some("Alice Example <alice@example.com>"));
    assert_eq!(alice.user_ids.len(), 2);
    assert_eq!(alice.user_ids[1].uid, "Alice : Work <alice@work.example>");
    assert_eq!(alice.user_ids[1].email(), Some("alice@work.example"));

    assert_eq!(alice.subkeys.len(), 1);
    let sub = &alice.subkeys[0];
    assert_eq!(sub.key_id, "9A8B7C6D5E4F3021");
    assert_eq!(
        sub.fingerprint.as_deref(),
        Some("FEDCBA9876543210FEDCBA989A8B7C6D5E4F3021")
    );
    assert_eq!(sub.algorithm, 18);
    assert!(sub.capabilities.own.encrypt && !sub.capabilities.own.sign);
}

#[test]
fn test_fixture_iso_dates_and_multiple_subkeys() {
    let keys = parse_keylist(FIXTURE).unwrap();
    let bob = &keys[1];

    assert_eq!(bob.validity, Validity::Full);
    assert_eq!(bob.created, Utc.with_ymd_and_hms(2020, 5, 1, 0, 0, 0).unwrap());
    assert_eq!(bob.expires, Some(Utc.with_ymd_and_hms(2030, 5, 1, 0, 0, 0).unwrap()));
    assert!(bob.capabilities.usable.authenticate);
    assert_eq!(bob.display_name(), Some("Bob Builder <bob@example.org>"));
    assert_eq!(bob.user_ids[0].validity, Validity::Full);

    assert_eq!(bob.subkeys.len(), 2);
    let enc = &bob.subkeys[0];
    assert_eq!(enc.created, Utc.with_ymd_and_hms(2020, 5, 1, 12, 0, 0).unwrap());
    assert_eq!(enc.expires, Some(Utc.with_ymd_and_hms(2030, 5, 1, 12, 0, 0).unwrap()));
    assert_eq!(
        enc.fingerprint.as_deref(),
        Some("1111222233334444555566668899AABBCCDDEEFF")
    );

    let auth = &bob.subkeys[1];
    assert_eq!(auth.fingerprint, None);
    assert!(auth.capabilities.own.authenticate && !auth.capabilities.own.encrypt);
}

#[test]
fn test_fixture_revoked_disabled_key() {
    let keys = parse_keylist(FIXTURE).unwrap();
    let carol = &keys[2];

    assert_eq!(carol.validity, Validity::Revoked);
    assert_eq!(carol.length, 2048);
    assert_eq!(carol.created, Utc.with_ymd_and_hms(2017, 7, 14, 2, 40, 0).unwrap());
    assert!(carol.capabilities.disabled);
    assert!(!carol.capabilities.usable.encrypt);
    assert_eq!(
        carol.fingerprint.as_deref(),
        Some("7777888899990000AAAABBBBDEADBEEFCAFEBABE")
    );
    assert_eq!(carol.display_name(), Some("Carol (old) <carol@example.net>"));
    assert_eq!(carol.user_ids[0].validity, Validity::Revoked);
    assert!(carol.subkeys.is_empty());
}

#[test]
fn test_fixture_serializes() {
    let keys = parse_keylist(FIXTURE).unwrap();
    let json = serde_json::to_value(&keys).unwrap();

    assert_eq!(json[0]["kind"], "public");
    assert_eq!(json[0]["validity"], "ultimate");
    assert_eq!(json[2]["capabilities"]["disabled"], true);
    assert_eq!(json[1]["user_ids"][0]["uid"], "Bob Builder <bob@example.org>");
}
