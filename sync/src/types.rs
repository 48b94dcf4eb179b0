//! Core value types: addresses, ciphertext handles, clear values and the
//! metric fields they belong to.

use crate::errors::{SyncError, SyncResult};
use crate::guard::Operation;
use crate::state::{ClearValues, SyncState};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// Size of an account/contract address in bytes
pub const ADDRESS_SIZE: usize = 20;

/// Size of an encrypted handle in bytes
pub const HANDLE_SIZE: usize = 32;

fn decode_hex<const N: usize>(input: &str) -> Option<[u8; N]> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    let bytes = hex::decode(digits).ok()?;
    bytes.try_into().ok()
}

/// A 20-byte account or contract address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// The all-zero address, used by deployments that were never filled in
    pub const ZERO: Address = Address([0u8; ADDRESS_SIZE]);

    pub const fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_SIZE]
    }

    /// Lowercase `0x`-prefixed hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = SyncError;

    fn from_str(s: &str) -> SyncResult<Self> {
        decode_hex(s)
            .map(Address)
            .ok_or_else(|| SyncError::InvalidAddress(s.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Opaque identifier of a ciphertext held by the confidential backend.
///
/// A handle is always scoped to the contract that produced it. The all-zero
/// handle is the "nothing recorded yet" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EncryptedHandle([u8; HANDLE_SIZE]);

impl EncryptedHandle {
    pub const ZERO: EncryptedHandle = EncryptedHandle([0u8; HANDLE_SIZE]);

    pub const fn new(bytes: [u8; HANDLE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HANDLE_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HANDLE_SIZE]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// First four bytes in hex, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl FromStr for EncryptedHandle {
    type Err = SyncError;

    fn from_str(s: &str) -> SyncResult<Self> {
        decode_hex(s)
            .map(EncryptedHandle)
            .ok_or_else(|| SyncError::InvalidHandle(s.to_string()))
    }
}

impl fmt::Display for EncryptedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for EncryptedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedHandle({})", self.to_hex())
    }
}

impl Serialize for EncryptedHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EncryptedHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A decrypted scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearScalar {
    /// Unsigned value as it came off the wire
    Uint(u64),
    /// Signed value after two's-complement normalization
    Int(i64),
    /// Encrypted boolean
    Bool(bool),
}

impl fmt::Display for ClearScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClearScalar::Uint(v) => write!(f, "{}", v),
            ClearScalar::Int(v) => write!(f, "{}", v),
            ClearScalar::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// A clear value tagged with the handle it was decrypted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearValue {
    pub handle: EncryptedHandle,
    pub value: ClearScalar,
}

impl ClearValue {
    /// Whether this value was derived from `latest`
    pub fn is_current_for(&self, latest: &EncryptedHandle) -> bool {
        self.handle == *latest
    }
}

/// A named field whose handle can be batch-decrypted.
///
/// Each field type belongs to one decryption group; the group picks the
/// in-flight guard and the clear-value set the results land in.
pub trait MetricField: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Guard category for decrypting this group of fields
    const GROUP: Operation;

    /// Whether the wire value must be read as a signed 32-bit integer
    fn is_signed(self) -> bool;

    /// Stable display name
    fn name(self) -> &'static str;

    /// The clear-value set owned by this group
    fn clear_values(state: &mut SyncState) -> &mut ClearValues<Self>;
}

/// Fields of the per-user score set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScoreField {
    Overall,
    Cardio,
    Activity,
    Sleep,
    AnomalyFlag,
}

impl ScoreField {
    pub const ALL: [ScoreField; 5] = [
        ScoreField::Overall,
        ScoreField::Cardio,
        ScoreField::Activity,
        ScoreField::Sleep,
        ScoreField::AnomalyFlag,
    ];
}

impl MetricField for ScoreField {
    const GROUP: Operation = Operation::DecryptScores;

    fn is_signed(self) -> bool {
        false
    }

    fn name(self) -> &'static str {
        match self {
            ScoreField::Overall => "overall",
            ScoreField::Cardio => "cardio",
            ScoreField::Activity => "activity",
            ScoreField::Sleep => "sleep",
            ScoreField::AnomalyFlag => "anomalyFlag",
        }
    }

    fn clear_values(state: &mut SyncState) -> &mut ClearValues<Self> {
        &mut state.score_clear
    }
}

/// Fields of the time-series aggregate bundle, in event order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeSeriesField {
    AvgHeartRate,
    AvgSteps,
    AvgSleep,
    TrendHeartRate,
    TrendSteps,
    TrendSleep,
    VolatilityHeartRate,
    VolatilitySteps,
    VolatilitySleep,
}

impl TimeSeriesField {
    pub const ALL: [TimeSeriesField; 9] = [
        TimeSeriesField::AvgHeartRate,
        TimeSeriesField::AvgSteps,
        TimeSeriesField::AvgSleep,
        TimeSeriesField::TrendHeartRate,
        TimeSeriesField::TrendSteps,
        TimeSeriesField::TrendSleep,
        TimeSeriesField::VolatilityHeartRate,
        TimeSeriesField::VolatilitySteps,
        TimeSeriesField::VolatilitySleep,
    ];

    /// Trend fields are rates of change and may be negative
    pub fn is_trend(self) -> bool {
        matches!(
            self,
            TimeSeriesField::TrendHeartRate
                | TimeSeriesField::TrendSteps
                | TimeSeriesField::TrendSleep
        )
    }
}

impl MetricField for TimeSeriesField {
    const GROUP: Operation = Operation::DecryptTimeSeries;

    fn is_signed(self) -> bool {
        self.is_trend()
    }

    fn name(self) -> &'static str {
        match self {
            TimeSeriesField::AvgHeartRate => "avgHeartRate",
            TimeSeriesField::AvgSteps => "avgSteps",
            TimeSeriesField::AvgSleep => "avgSleep",
            TimeSeriesField::TrendHeartRate => "trendHeartRate",
            TimeSeriesField::TrendSteps => "trendSteps",
            TimeSeriesField::TrendSleep => "trendSleep",
            TimeSeriesField::VolatilityHeartRate => "volatilityHeartRate",
            TimeSeriesField::VolatilitySteps => "volatilitySteps",
            TimeSeriesField::VolatilitySleep => "volatilitySleep",
        }
    }

    fn clear_values(state: &mut SyncState) -> &mut ClearValues<Self> {
        &mut state.time_series_clear
    }
}

/// Current score handles for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreHandles {
    pub overall: EncryptedHandle,
    pub cardio: EncryptedHandle,
    pub activity: EncryptedHandle,
    pub sleep: EncryptedHandle,
    pub anomaly_flag: EncryptedHandle,
}

impl ScoreHandles {
    /// Build from the `getHealthScores` tuple and the anomaly flag handle
    pub fn from_ledger(scores: [EncryptedHandle; 4], anomaly_flag: EncryptedHandle) -> Self {
        let [overall, cardio, activity, sleep] = scores;
        Self {
            overall,
            cardio,
            activity,
            sleep,
            anomaly_flag,
        }
    }

    pub fn get(&self, field: ScoreField) -> EncryptedHandle {
        match field {
            ScoreField::Overall => self.overall,
            ScoreField::Cardio => self.cardio,
            ScoreField::Activity => self.activity,
            ScoreField::Sleep => self.sleep,
            ScoreField::AnomalyFlag => self.anomaly_flag,
        }
    }

    pub fn entries(&self) -> Vec<(ScoreField, EncryptedHandle)> {
        ScoreField::ALL.iter().map(|f| (*f, self.get(*f))).collect()
    }
}

/// The nine handles produced atomically by one aggregate query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesAggregateHandles {
    handles: [EncryptedHandle; 9],
}

impl TimeSeriesAggregateHandles {
    /// Build from handles in event order (see [`TimeSeriesField::ALL`])
    pub fn from_positional(handles: [EncryptedHandle; 9]) -> Self {
        Self { handles }
    }

    pub fn get(&self, field: TimeSeriesField) -> EncryptedHandle {
        self.handles[field as usize]
    }

    pub fn as_positional(&self) -> &[EncryptedHandle; 9] {
        &self.handles
    }

    pub fn entries(&self) -> Vec<(TimeSeriesField, EncryptedHandle)> {
        TimeSeriesField::ALL
            .iter()
            .map(|f| (*f, self.get(*f)))
            .collect()
    }

    /// At least one handle names a recorded value
    pub fn has_any_value(&self) -> bool {
        self.handles.iter().any(|h| !h.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let addr: Address = "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap();
        assert_eq!(addr.to_hex(), "0x5fbdb2315678afecb367f032d93f642f64180aa3");
        assert!(!addr.is_zero());
        assert!(Address::ZERO.is_zero());
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        assert!(matches!(
            "0x1234".parse::<Address>(),
            Err(SyncError::InvalidAddress(_))
        ));
        assert!("not-hex".parse::<Address>().is_err());
    }

    #[test]
    fn test_handle_zero_sentinel() {
        let zero: EncryptedHandle = format!("0x{}", "00".repeat(32)).parse().unwrap();
        assert!(zero.is_zero());
        assert_eq!(zero, EncryptedHandle::ZERO);

        let handle = EncryptedHandle::new([0xAA; 32]);
        assert!(!handle.is_zero());
        assert_eq!(handle.short(), "aaaaaaaa");
    }

    #[test]
    fn test_handle_serde_as_hex_string() {
        let handle = EncryptedHandle::new([0xBB; 32]);
        let json = serde_json::to_string(&handle).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "bb".repeat(32)));

        let restored: EncryptedHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, handle);
    }

    #[test]
    fn test_trend_fields_are_signed() {
        let signed: Vec<_> = TimeSeriesField::ALL
            .iter()
            .filter(|f| f.is_signed())
            .collect();
        assert_eq!(signed.len(), 3);
        assert!(ScoreField::ALL.iter().all(|f| !f.is_signed()));
    }

    #[test]
    fn test_aggregate_positional_order() {
        let mut raw = [EncryptedHandle::ZERO; 9];
        for (i, h) in raw.iter_mut().enumerate() {
            *h = EncryptedHandle::new([i as u8 + 1; 32]);
        }
        let bundle = TimeSeriesAggregateHandles::from_positional(raw);

        assert_eq!(bundle.get(TimeSeriesField::AvgHeartRate), raw[0]);
        assert_eq!(bundle.get(TimeSeriesField::TrendSteps), raw[4]);
        assert_eq!(bundle.get(TimeSeriesField::VolatilitySleep), raw[8]);
        assert!(bundle.has_any_value());
        assert!(!TimeSeriesAggregateHandles::from_positional([EncryptedHandle::ZERO; 9])
            .has_any_value());
    }
}
