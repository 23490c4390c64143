//! Keyring listing parser
//!
//! Turns `gpg --with-colons --list-public-keys` (or `--list-secret-keys`)
//! output into [`Key`] records. Each line is one record, fields separated
//! by `:`; the first field names the record type.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use gpgmux_core::{Error, Result};
use serde::Serialize;
use tracing::trace;

/// Public or secret keyring entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// `pub` record
    Public,
    /// `sec` record
    Secret,
}

/// Computed validity of a key or user id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    /// `o`, `-`, `q`, `s`, `w` or empty
    Unknown,
    /// `i`
    Invalid,
    /// `d`
    Disabled,
    /// `r`
    Revoked,
    /// `e`
    Expired,
    /// `n`
    Never,
    /// `m`
    Marginal,
    /// `f`
    Full,
    /// `u`
    Ultimate,
}

impl Validity {
    /// Decode the validity field; `None` for letters gpg never emits
    pub fn from_field(field: &str) -> Option<Self> {
        let validity = match field {
            "" | "o" | "-" | "q" | "s" | "w" => Self::Unknown,
            "i" => Self::Invalid,
            "d" => Self::Disabled,
            "r" => Self::Revoked,
            "e" => Self::Expired,
            "n" => Self::Never,
            "m" => Self::Marginal,
            "f" => Self::Full,
            "u" => Self::Ultimate,
            _ => return None,
        };
        Some(validity)
    }
}

/// A set of key usages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    /// `e`
    pub encrypt: bool,
    /// `s`
    pub sign: bool,
    /// `c`
    pub certify: bool,
    /// `a`
    pub authenticate: bool,
}

impl Usage {
    fn set(&mut self, letter: char) {
        match letter {
            'e' => self.encrypt = true,
            's' => self.sign = true,
            'c' => self.certify = true,
            'a' => self.authenticate = true,
            _ => {}
        }
    }

    /// True when no usage is set
    pub fn is_empty(&self) -> bool {
        !(self.encrypt || self.sign || self.certify || self.authenticate)
    }
}

/// Decoded capabilities field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Lowercase letters: what this particular (sub)key can do
    pub own: Usage,
    /// Uppercase letters: what the key as a whole is usable for
    pub usable: Usage,
    /// `D`
    pub disabled: bool,
}

impl Capabilities {
    /// Decode a field such as `scESC`. Unknown letters are skipped.
    pub fn from_field(field: &str) -> Self {
        let mut caps = Self::default();
        for letter in field.chars() {
            match letter {
                'D' => caps.disabled = true,
                c if c.is_ascii_lowercase() => caps.own.set(c),
                c if c.is_ascii_uppercase() => caps.usable.set(c.to_ascii_lowercase()),
                _ => {}
            }
        }
        caps
    }
}

/// Subkey of a [`Key`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subkey {
    /// 16 hex digit key id
    pub key_id: String,
    /// Full fingerprint, when an `fpr` record followed
    pub fingerprint: Option<String>,
    pub validity: Validity,
    /// Key length in bits
    pub length: u32,
    /// OpenPGP public key algorithm number
    pub algorithm: u32,
    pub created: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
    pub capabilities: Capabilities,
}

/// User id attached to a [`Key`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserId {
    pub validity: Validity,
    /// Decoded user id, e.g. `Alice <alice@example.com>`
    pub uid: String,
    pub created: Option<DateTime<Utc>>,
}

impl UserId {
    /// Address between the last `<` and `>`, if any
    pub fn email(&self) -> Option<&str> {
        let start = self.uid.rfind('<')?;
        let end = self.uid[start..].find('>')? + start;
        Some(&self.uid[start + 1..end])
    }
}

/// Primary key with its user ids and subkeys
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Key {
    pub kind: KeyKind,
    pub key_id: String,
    pub fingerprint: Option<String>,
    pub validity: Validity,
    pub length: u32,
    pub algorithm: u32,
    pub created: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
    pub capabilities: Capabilities,
    pub user_ids: Vec<UserId>,
    pub subkeys: Vec<Subkey>,
}

impl Key {
    /// First user id, the one gpg shows for the key
    pub fn display_name(&self) -> Option<&str> {
        self.user_ids.first().map(|u| u.uid.as_str())
    }

    /// Case-insensitive match on key id suffix, fingerprint suffix, or a
    /// user id substring
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().trim_start_matches("0x").to_ascii_lowercase();
        if query.is_empty() {
            return false;
        }
        let suffix_of = |id: &str| id.to_ascii_lowercase().ends_with(&query);

        suffix_of(&self.key_id)
            || self.fingerprint.as_deref().is_some_and(suffix_of)
            || self
                .subkeys
                .iter()
                .any(|s| suffix_of(&s.key_id) || s.fingerprint.as_deref().is_some_and(suffix_of))
            || self
                .user_ids
                .iter()
                .any(|u| u.uid.to_lowercase().contains(&query))
    }
}

/// Where the next `fpr` record belongs
#[derive(Clone, Copy)]
enum FprTarget {
    Primary,
    Subkey,
    Nothing,
}

/// Parse a complete colon listing
pub fn parse_keylist(output: &str) -> Result<Vec<Key>> {
    let mut keys: Vec<Key> = Vec::new();
    let mut fpr_target = FprTarget::Nothing;

    for (index, line) in output.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let record = Record::new(line);

        match record.kind() {
            "pub" | "sec" => {
                let kind = if record.kind() == "pub" {
                    KeyKind::Public
                } else {
                    KeyKind::Secret
                };
                let fields = KeyFields::parse(&record, line_no)?;
                keys.push(Key {
                    kind,
                    key_id: fields.key_id,
                    fingerprint: None,
                    validity: fields.validity,
                    length: fields.length,
                    algorithm: fields.algorithm,
                    created: fields.created,
                    expires: fields.expires,
                    capabilities: fields.capabilities,
                    user_ids: Vec::new(),
                    subkeys: Vec::new(),
                });
                fpr_target = FprTarget::Primary;
            }
            "sub" | "ssb" => {
                let fields = KeyFields::parse(&record, line_no)?;
                let key = current_key(&mut keys, line_no, "subkey")?;
                key.subkeys.push(Subkey {
                    key_id: fields.key_id,
                    fingerprint: None,
                    validity: fields.validity,
                    length: fields.length,
                    algorithm: fields.algorithm,
                    created: fields.created,
                    expires: fields.expires,
                    capabilities: fields.capabilities,
                });
                fpr_target = FprTarget::Subkey;
            }
            "uid" => {
                let user_id = UserId {
                    validity: parse_validity(record.field(2), line_no)?,
                    uid: decode_escapes(record.field(10)),
                    created: parse_date(record.field(6), line_no)?,
                };
                current_key(&mut keys, line_no, "user id")?
                    .user_ids
                    .push(user_id);
                fpr_target = FprTarget::Nothing;
            }
            "fpr" => {
                let fingerprint = record.field(10).to_string();
                let key = current_key(&mut keys, line_no, "fingerprint")?;
                match fpr_target {
                    FprTarget::Primary => key.fingerprint = Some(fingerprint),
                    FprTarget::Subkey => {
                        if let Some(sub) = key.subkeys.last_mut() {
                            sub.fingerprint = Some(fingerprint);
                        }
                    }
                    FprTarget::Nothing => trace!(line = line_no, "fingerprint without key record"),
                }
                fpr_target = FprTarget::Nothing;
            }
            other => trace!(line = line_no, record = other, "skipping listing record"),
        }
    }

    Ok(keys)
}

fn current_key<'k>(keys: &'k mut [Key], line: usize, what: &str) -> Result<&'k mut Key> {
    keys.last_mut()
        .ok_or_else(|| Error::parse(line, format!("{what} before any primary key")))
}

/// One colon-separated line with 1-based field access
struct Record<'l> {
    fields: Vec<&'l str>,
}

impl<'l> Record<'l> {
    fn new(line: &'l str) -> Self {
        Self {
            fields: line.split(':').collect(),
        }
    }

    fn kind(&self) -> &'l str {
        self.field(1)
    }

    /// Missing trailing fields read as empty
    fn field(&self, n: usize) -> &'l str {
        self.fields.get(n - 1).copied().unwrap_or("")
    }
}

/// Fields shared by primary keys and subkeys
struct KeyFields {
    validity: Validity,
    length: u32,
    algorithm: u32,
    key_id: String,
    created: DateTime<Utc>,
    expires: Option<DateTime<Utc>>,
    capabilities: Capabilities,
}

impl KeyFields {
    fn parse(record: &Record<'_>, line: usize) -> Result<Self> {
        let key_id = record.field(5);
        if key_id.is_empty() {
            return Err(Error::parse(line, "missing key id"));
        }
        let created = parse_date(record.field(6), line)?
            .ok_or_else(|| Error::parse(line, "missing creation date"))?;

        Ok(Self {
            validity: parse_validity(record.field(2), line)?,
            length: parse_number(record.field(3), "key length", line)?,
            algorithm: parse_number(record.field(4), "algorithm", line)?,
            key_id: key_id.to_string(),
            created,
            expires: parse_date(record.field(7), line)?,
            capabilities: Capabilities::from_field(record.field(12)),
        })
    }
}

fn parse_validity(field: &str, line: usize) -> Result<Validity> {
    Validity::from_field(field)
        .ok_or_else(|| Error::parse(line, format!("unknown validity {field:?}")))
}

fn parse_number(field: &str, what: &str, line: usize) -> Result<u32> {
    field
        .parse()
        .map_err(|_| Error::parse(line, format!("invalid {what} {field:?}")))
}

/// Parse a listing date. gpg writes seconds since the epoch by default,
/// and ISO forms under `--fixed-list-mode` variants.
pub(crate) fn parse_date(field: &str, line: usize) -> Result<Option<DateTime<Utc>>> {
    if field.is_empty() {
        return Ok(None);
    }
    let invalid = || Error::parse(line, format!("invalid date {field:?}"));

    if field.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = field.parse().map_err(|_| invalid())?;
        return DateTime::from_timestamp(secs, 0).map(Some).ok_or_else(invalid);
    }
    if field.contains('T') {
        return NaiveDateTime::parse_from_str(field, "%Y%m%dT%H%M%S")
            .map(|dt| Some(dt.and_utc()))
            .map_err(|_| invalid());
    }
    NaiveDate::parse_from_str(field, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Some(dt.and_utc()))
        .ok_or_else(invalid)
}

/// Undo gpg's `\xNN` escaping of user ids. Malformed escapes stay literal.
pub fn decode_escapes(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && bytes.get(i + 1) == Some(&b'x') {
            let decoded = bytes
                .get(i + 2..i + 4)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpgmux_core::ErrorKind;

    const SECRET_LISTING: &str = "\
sec:u:255:22:1A2B3C4D5E6F7081:1700000000:::u:::scESC:::+:::ed25519:::0:
fpr:::::::::0123456789ABCDEF012345671A2B3C4D5E6F7081:
grp:::::::::5B8B8D4A3A0C7F6E2D1C0B9A8F7E6D5C4B3A2918:
uid:u::::1700000000::4E2B3C::Alice Example <alice@example.com>::::::::::0:
ssb:u:255:18:9A8B7C6D5E4F3021:1700000000::::::e:::+:::cv25519::
fpr:::::::::FEDCBA9876543210FEDCBA989A8B7C6D5E4F3021:
";

    fn parse_err(listing: &str) -> (usize, String) {
        match parse_keylist(listing).unwrap_err() {
            Error::Parse { line, reason } => (line, reason),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_secret_listing() {
        let keys = parse_keylist(SECRET_LISTING).unwrap();
        assert_eq!(keys.len(), 1);

        let key = &keys[0];
        assert_eq!(key.kind, KeyKind::Secret);
        assert_eq!(key.key_id, "1A2B3C4D5E6F7081");
        assert_eq!(
            key.fingerprint.as_deref(),
            Some("0123456789ABCDEF012345671A2B3C4D5E6F7081")
        );
        assert_eq!(key.algorithm, 22);
        assert_eq!(key.display_name(), Some("Alice Example <alice@example.com>"));
        assert_eq!(key.subkeys.len(), 1);
        assert_eq!(
            key.subkeys[0].fingerprint.as_deref(),
            Some("FEDCBA9876543210FEDCBA989A8B7C6D5E4F3021")
        );
        assert!(key.subkeys[0].capabilities.own.encrypt);
        assert!(!key.subkeys[0].capabilities.own.sign);
    }

    #[test]
    fn test_capabilities() {
        let caps = Capabilities::from_field("scESCA?D");
        assert!(caps.own.sign && caps.own.certify);
        assert!(!caps.own.encrypt && !caps.own.authenticate);
        assert!(caps.usable.encrypt && caps.usable.sign);
        assert!(caps.usable.certify && caps.usable.authenticate);
        assert!(caps.disabled);

        let none = Capabilities::from_field("");
        assert!(none.own.is_empty() && none.usable.is_empty() && !none.disabled);
    }

    #[test]
    fn test_validity_letters() {
        for letter in ["", "o", "-", "q", "s", "w"] {
            assert_eq!(Validity::from_field(letter), Some(Validity::Unknown));
        }
        assert_eq!(Validity::from_field("u"), Some(Validity::Ultimate));
        assert_eq!(Validity::from_field("f"), Some(Validity::Full));
        assert_eq!(Validity::from_field("r"), Some(Validity::Revoked));
        assert_eq!(Validity::from_field("x"), None);
    }

    #[test]
    fn test_date_forms() {
        let epoch = parse_date("1700000000", 1).unwrap().unwrap();
        assert_eq!(epoch.timestamp(), 1_700_000_000);

        let day = parse_date("2020-05-01", 1).unwrap().unwrap();
        assert_eq!(day.to_rfc3339(), "2020-05-01T00:00:00+00:00");

        let iso = parse_date("20200501T120000", 1).unwrap().unwrap();
        assert_eq!(iso.to_rfc3339(), "2020-05-01T12:00:00+00:00");

        assert_eq!(parse_date("", 1).unwrap(), None);
        assert_eq!(parse_date("yesterday", 4).unwrap_err().kind(), ErrorKind::Parse);
        assert_eq!(parse_date("2020-13-45", 4).unwrap_err().kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_decode_escapes() {
        assert_eq!(
            decode_escapes(r"Carol \x28old\x29 <carol@example.net>"),
            "Carol (old) <carol@example.net>"
        );
        assert_eq!(decode_escapes(r"J\xc3\xbcrgen"), "Jürgen");
        assert_eq!(decode_escapes(r"a\x3ab"), "a:b");
        assert_eq!(decode_escapes(r"trailing \x4"), r"trailing \x4");
        assert_eq!(decode_escapes(r"bad \xZZ"), r"bad \xZZ");
    }

    #[test]
    fn test_email() {
        let uid = UserId {
            validity: Validity::Full,
            uid: "Bob <bob@example.org>".to_string(),
            created: None,
        };
        assert_eq!(uid.email(), Some("bob@example.org"));

        let bare = UserId {
            uid: "bob only".to_string(),
            ..uid
        };
        assert_eq!(bare.email(), None);
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let (line, reason) = parse_err("tru::1:1700000000:0:3:1:5\nsub:u:255:18:AB:1700000000:\n");
        assert_eq!(line, 2);
        assert!(reason.contains("before any primary key"));

        let (line, reason) = parse_err("pub:z:255:22:AB:1700000000:\n");
        assert_eq!(line, 1);
        assert!(reason.contains("validity"));

        let (_, reason) = parse_err("pub:u:big:22:AB:1700000000:\n");
        assert!(reason.contains("key length"));

        let (_, reason) = parse_err("pub:u:255:22::1700000000:\n");
        assert!(reason.contains("key id"));

        let (_, reason) = parse_err("pub:u:255:22:AB::\n");
        assert!(reason.contains("creation date"));

        let (line, _) = parse_err("uid:u::::::::Nobody:\n");
        assert_eq!(line, 1);
    }

    #[test]
    fn test_empty_listing() {
        assert!(parse_keylist("").unwrap().is_empty());
        assert!(parse_keylist("tru::1:1700000000:0:3:1:5\n").unwrap().is_empty());
    }

    #[test]
    fn test_matches() {
        let keys = parse_keylist(SECRET_LISTING).unwrap();
        let key = &keys[0];
        assert!(key.matches("5E6F7081"));
        assert!(key.matches("0x1a2b3c4d5e6f7081"));
        assert!(key.matches("9A8B7C6D5E4F3021"));
        assert!(key.matches("ALICE@example"));
        assert!(!key.matches("bob"));
        assert!(!key.matches("  "));
    }
}
