//! A module containing data structures shared by the DPF, BitMore and puncturable set schemes
use ark_serialize::{
    CanonicalDeserialize as Deserialize, CanonicalSerialize as Serialize, SerializationError,
};
use ark_std::io::{Read, Write};
use rand::RngCore;
use std::{
    fmt,
    ops::{BitXor, BitXorAssign, Index, IndexMut},
};

/// Size of a `Block` in bytes
pub const BLOCK_SIZE: usize = 16;

/// A 128-bit value laid out as 16 little-endian bytes.
///
/// Every buffer of `Block`s is 16-byte aligned, which is the alignment contract the batched AES
/// calls and the packed leaf layouts rely on.
#[repr(C, align(16))]
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct Block(pub [u8; BLOCK_SIZE]);

impl Block {
    pub const ZERO: Self = Self([0u8; BLOCK_SIZE]);

    #[inline]
    pub const fn from_u128(val: u128) -> Self {
        Self(val.to_le_bytes())
    }

    #[inline]
    pub fn to_u128(self) -> u128 {
        u128::from_le_bytes(self.0)
    }

    /// Sample a uniformly random block
    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut out = Self::ZERO;
        rng.fill_bytes(&mut out.0);
        out
    }

    /// The least significant bit, used as a GGM control bit
    #[inline]
    pub fn lsb(&self) -> bool {
        (self.0[0] & 1) == 1
    }

    #[inline]
    pub fn clear_lsb(mut self) -> Self {
        self.0[0] &= 0xFE;
        self
    }

    #[inline]
    pub fn set_lsb(mut self, bit: bool) -> Self {
        self.0[0] = (self.0[0] & 0xFE) | bit as u8;
        self
    }

    /// Returns `self ^ other` if `cond` is set and `self` otherwise, without branching on `cond`.
    #[inline]
    pub fn xor_if(self, other: &Self, cond: bool) -> Self {
        let mask = 0u128.wrapping_sub(cond as u128);
        Self::from_u128(self.to_u128() ^ (other.to_u128() & mask))
    }

    /// Reads the `lane`-th little-endian 32-bit word
    #[inline]
    pub fn lane_u32(&self, lane: usize) -> u32 {
        debug_assert!(lane < 4);
        let start = lane * 4;
        u32::from_le_bytes([
            self.0[start],
            self.0[start + 1],
            self.0[start + 2],
            self.0[start + 3],
        ])
    }

    #[inline]
    pub fn set_lane_u32(&mut self, lane: usize, val: u32) {
        debug_assert!(lane < 4);
        self.0[lane * 4..lane * 4 + 4].copy_from_slice(&val.to_le_bytes());
    }

    /// Reads the `lane`-th little-endian 64-bit word
    #[inline]
    pub fn lane_u64(&self, lane: usize) -> u64 {
        debug_assert!(lane < 2);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[lane * 8..lane * 8 + 8]);
        u64::from_le_bytes(bytes)
    }
}

impl From<u128> for Block {
    fn from(val: u128) -> Self {
        Self::from_u128(val)
    }
}

impl From<[u8; BLOCK_SIZE]> for Block {
    fn from(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Block {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for Block {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl BitXor for Block {
    type Output = Self;

    #[inline]
    fn bitxor(self, rhs: Self) -> Self::Output {
        Self::from_u128(self.to_u128() ^ rhs.to_u128())
    }
}

impl BitXorAssign for Block {
    #[inline]
    fn bitxor_assign(&mut self, rhs: Self) {
        *self = *self ^ rhs;
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({:032x})", self.to_u128())
    }
}

impl Serialize for Block {
    fn serialize<W: Write>(&self, mut writer: W) -> Result<(), SerializationError> {
        writer.write_all(&self.0)?;
        Ok(())
    }

    fn serialized_size(&self) -> usize {
        BLOCK_SIZE
    }
}

impl Deserialize for Block {
    fn deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut out = Self::ZERO;
        reader.read_exact(&mut out.0)?;
        Ok(out)
    }
}

/// A container for two identical-type objects which can be indexed using `bool`
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Pair<T>([T; 2]);

impl<T> Pair<T> {
    #[inline]
    pub fn new(first: T, second: T) -> Self {
        Self([first, second])
    }
}

impl<T> Index<usize> for Pair<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        assert!(index == 0 || index == 1);
        &self.0[index]
    }
}

impl<T> IndexMut<usize> for Pair<T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        assert!(index == 0 || index == 1);
        &mut self.0[index]
    }
}

impl<T> Index<bool> for Pair<T> {
    type Output = T;

    fn index(&self, index: bool) -> &Self::Output {
        &self.0[index as usize]
    }
}

impl<T> IndexMut<bool> for Pair<T> {
    fn index_mut(&mut self, index: bool) -> &mut Self::Output {
        &mut self.0[index as usize]
    }
}

impl Pair<bool> {
    /// Both bits packed into one byte as `(self[0] << 1) | self[1]`
    #[inline]
    pub fn to_byte(&self) -> u8 {
        (self[0] as u8) << 1 | self[1] as u8
    }

    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        Pair([(byte & 2) == 2, (byte & 1) == 1])
    }
}

/// For `Pair<bool>` we can save space by encoding both bits into a single `u8`.
impl Serialize for Pair<bool> {
    fn serialize<W: Write>(&self, mut writer: W) -> Result<(), SerializationError> {
        self.to_byte().serialize(&mut writer)
    }

    fn serialized_size(&self) -> usize {
        1
    }
}

/// For `Pair<bool>` we can save space by encoding both bits into a single `u8`.
impl Deserialize for Pair<bool> {
    #[inline]
    fn deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let byte = <u8>::deserialize(&mut reader)?;
        Ok(Pair::from_byte(byte))
    }
}

#[cfg(test)]
mod tests {
    use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
    use ark_std::test_rng;
    use rand::Rng;

    use super::{Block, Pair};

    #[test]
    fn test_pair_serialization() {
        let mut rng = test_rng();

        let mut control_bits = Pair::<bool>::default();
        control_bits[0] = rng.gen_bool(0.5);
        control_bits[1] = rng.gen_bool(0.5);

        // Serialize the pair and assert it packs into one byte
        let mut serialized_bits = vec![0; control_bits.serialized_size()];
        control_bits.serialize(&mut serialized_bits[..]).unwrap();
        assert!(serialized_bits.len() == 1);

        let recovered_bits = <Pair<bool>>::deserialize(serialized_bits.as_slice()).unwrap();
        assert!(control_bits == recovered_bits);
    }

    #[test]
    fn test_block_bit_helpers() {
        let mut rng = test_rng();
        let block = Block::random(&mut rng);

        assert!(!block.clear_lsb().lsb());
        assert!(block.set_lsb(true).lsb());
        assert_eq!(block.clear_lsb().to_u128() >> 1, block.to_u128() >> 1);

        let other = Block::random(&mut rng);
        assert_eq!(block.xor_if(&other, true), block ^ other);
        assert_eq!(block.xor_if(&other, false), block);
    }

    #[test]
    fn test_block_lanes() {
        let mut block = Block::from_u128(0x0000_0004_0000_0003_0000_0002_0000_0001);
        for lane in 0..4 {
            assert_eq!(block.lane_u32(lane), lane as u32 + 1);
        }
        assert_eq!(block.lane_u64(0), 0x0000_0002_0000_0001);

        block.set_lane_u32(2, 0);
        assert_eq!(block.lane_u32(2), 0);
        assert_eq!(block.lane_u32(3), 4);
    }

    #[test]
    fn test_block_alignment() {
        let blocks = vec![Block::ZERO; 3];
        assert_eq!(std::mem::align_of::<Block>(), 16);
        assert_eq!(blocks.as_ptr() as usize % 16, 0);
    }
}
