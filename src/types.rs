use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Serialize, Serializer};

/// 32-byte hash used for header, seal and seed hashes.
pub type Hash = [u8; 32];
/// 20-byte account address.
pub type Address = [u8; 20];
/// 8-byte proof-of-work nonce.
pub type BlockNonce = [u8; 8];
/// Compressed BLS signature carried in sealed headers.
pub type SignatureBytes = [u8; 96];

/// Block header as sealed by the engine.
///
/// `hash()` covers every field; `seal_hash()` leaves out `mix_digest` and
/// `nonce`, which are written by the sealer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub parent_hash: Hash,
    pub coinbase: Address,
    pub state_root: Hash,
    pub tx_hash: Hash,
    pub receipt_hash: Hash,
    pub difficulty: u64,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub time: u64,
    pub extra: Vec<u8>,
    pub mix_digest: Hash,
    pub nonce: BlockNonce,
}

const SEAL_FIELDS: usize = 11;
const HEADER_FIELDS: usize = 13;

impl Header {
    fn append_unsealed(&self, s: &mut RlpStream) {
        s.append(&self.parent_hash.as_slice());
        s.append(&self.coinbase.as_slice());
        s.append(&self.state_root.as_slice());
        s.append(&self.tx_hash.as_slice());
        s.append(&self.receipt_hash.as_slice());
        s.append(&self.difficulty);
        s.append(&self.number);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.time);
        s.append(&self.extra.as_slice());
    }

    /// Full hash of the header, including seal fields.
    pub fn hash(&self) -> Hash {
        blake3::hash(&rlp::encode(self)).into()
    }

    /// Hash of the header without `mix_digest` and `nonce`.
    pub fn seal_hash(&self) -> Hash {
        let mut s = RlpStream::new_list(SEAL_FIELDS);
        self.append_unsealed(&mut s);
        blake3::hash(&s.out()).into()
    }

    /// RLP encoding of the full header.
    pub fn encode(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }
}

impl Encodable for Header {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(HEADER_FIELDS);
        self.append_unsealed(s);
        s.append(&self.mix_digest.as_slice());
        s.append(&self.nonce.as_slice());
    }
}

impl Decodable for Header {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != HEADER_FIELDS {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Header {
            parent_hash: fixed_at(rlp, 0)?,
            coinbase: fixed_at(rlp, 1)?,
            state_root: fixed_at(rlp, 2)?,
            tx_hash: fixed_at(rlp, 3)?,
            receipt_hash: fixed_at(rlp, 4)?,
            difficulty: rlp.val_at(5)?,
            number: rlp.val_at(6)?,
            gas_limit: rlp.val_at(7)?,
            gas_used: rlp.val_at(8)?,
            time: rlp.val_at(9)?,
            extra: rlp.val_at(10)?,
            mix_digest: fixed_at(rlp, 11)?,
            nonce: fixed_at(rlp, 12)?,
        })
    }
}

/// Decode a fixed-width byte string at list position `index`.
pub(crate) fn fixed_at<const N: usize>(rlp: &Rlp, index: usize) -> Result<[u8; N], DecoderError> {
    rlp.at(index)?
        .data()?
        .try_into()
        .map_err(|_| DecoderError::RlpInvalidLength)
}

/// Candidate block handed to the engine for sealing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Vec<u8>>,
}

impl Block {
    pub fn new(header: Header) -> Self {
        Self {
            header,
            transactions: Vec::new(),
        }
    }

    /// Returns a copy of the block carrying `header` as its sealed header.
    pub fn with_seal(&self, header: Header) -> Self {
        Self {
            header,
            transactions: self.transactions.clone(),
        }
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }
}

/// Work offered to an external miner or validator.
///
/// The meaning of `secondary` and `payload` depends on the engine mode: in
/// proof-of-work mode they are the dataset seed hash and the target; in slot
/// mode they are the receipt root and the RLP-encoded header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPackage {
    pub seal_hash: Hash,
    pub secondary: Hash,
    pub payload: Vec<u8>,
    pub number: u64,
}

impl WorkPackage {
    /// The four hex strings handed out over the work endpoint.
    pub fn to_hex_array(&self) -> [String; 4] {
        [
            to_hex(&self.seal_hash),
            to_hex(&self.secondary),
            to_hex(&self.payload),
            encode_number(self.number),
        ]
    }
}

impl Serialize for WorkPackage {
    /// Serialize as the 4-string array external workers expect.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_hex_array().serialize(serializer)
    }
}

/// A worker's claimed solution for a previously issued work package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealSubmission {
    pub nonce: BlockNonce,
    pub mix_digest: Hash,
    pub seal_hash: Hash,
    pub signature: Option<SignatureBytes>,
}

/// Throughput reported by one remote worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashRateSample {
    pub id: Hash,
    pub rate: u64,
    pub ping: u64,
}

/// `0x`-prefixed lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode hex with an optional `0x` prefix.
pub fn from_hex(value: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
}

/// Minimal big-endian hex encoding of a block number (`0x` for zero).
pub fn encode_number(number: u64) -> String {
    let bytes = number.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    to_hex(&bytes[first..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            parent_hash: [1u8; 32],
            coinbase: [2u8; 20],
            receipt_hash: [3u8; 32],
            difficulty: 17,
            number: 42,
            time: 1_700_000_000,
            extra: vec![0xc3, 0x01, 0x02, 0x03],
            ..Default::default()
        }
    }

    #[test]
    fn header_rlp_decodes_back() {
        let header = sample_header();
        let decoded: Header = rlp::decode(&header.encode()).expect("decode header");
        assert_eq!(decoded, header);
    }

    #[test]
    fn header_encodes_complete_lists() {
        let header = Header {
            number: 3,
            ..Default::default()
        };
        let encoded = header.encode();
        let rlp = Rlp::new(&encoded);
        assert_eq!(rlp.item_count().expect("item count"), HEADER_FIELDS);
        assert_eq!(rlp.at(0).and_then(|item| item.data()).expect("parent"), &[0u8; 32]);
        assert_eq!(rlp.at(12).and_then(|item| item.data()).expect("nonce"), &[0u8; 8]);

        let mut s = RlpStream::new_list(SEAL_FIELDS);
        header.append_unsealed(&mut s);
        assert_eq!(Rlp::new(&s.out()).item_count().expect("item count"), SEAL_FIELDS);
        assert_ne!(header.hash(), header.seal_hash());
    }

    #[test]
    fn seal_hash_ignores_seal_fields() {
        let header = sample_header();
        let mut sealed = header.clone();
        sealed.mix_digest = [9u8; 32];
        sealed.nonce = [7u8; 8];
        assert_eq!(header.seal_hash(), sealed.seal_hash());
        assert_ne!(header.hash(), sealed.hash());
    }

    #[test]
    fn block_number_hex_is_minimal() {
        assert_eq!(encode_number(0), "0x");
        assert_eq!(encode_number(1), "0x01");
        assert_eq!(encode_number(0x1234), "0x1234");
    }

    #[test]
    fn work_package_serializes_as_string_array() {
        let work = WorkPackage {
            seal_hash: [0xab; 32],
            secondary: [0u8; 32],
            payload: vec![0xff],
            number: 1,
        };
        let json = serde_json::to_string(&work).expect("serialize work");
        let parsed: Vec<String> = serde_json::from_str(&json).expect("parse work");
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed[2], "0xff");
        assert_eq!(parsed[3], "0x01");
    }
}
