//! Binary block format.
//!
//! ```text
//! u8        version
//! u8        flags (bit 0 underground, bit 1 lighting complete)
//! u16 x4096 content ids, big endian
//! u8  x4096 param1
//! u8  x4096 param2
//! u16       metadata entry count
//!   u16       cell index
//!   u16       field count
//!     u16 + bytes  key
//!     u32 + bytes  value
//! ```

use anyhow::{bail, ensure, Context, Result};

use crate::engine_state::voxels::{block::MapNode, BlockPos, MAP_BLOCK_VOLUME};

use super::{MapBlock, NodeMetadata};

/// Version byte written by `MapBlock::serialize`.
pub const SERIALIZATION_VERSION: u8 = 1;

const FLAG_UNDERGROUND: u8 = 0x01;
const FLAG_LIGHTING_COMPLETE: u8 = 0x02;

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(len).context("length overflow")?;
        let Some(slice) = self.bytes.get(self.offset..end) else {
            bail!(
                "unexpected end of data at byte {} (wanted {len} more)",
                self.offset
            );
        };
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).context("metadata is not valid UTF-8")
    }
}

impl MapBlock {
    /// Encodes cells, flags and node metadata.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + MAP_BLOCK_VOLUME * 4 + 2);
        out.push(SERIALIZATION_VERSION);
        let mut flags = 0;
        if self.is_underground {
            flags |= FLAG_UNDERGROUND;
        }
        if self.lighting_complete {
            flags |= FLAG_LIGHTING_COMPLETE;
        }
        out.push(flags);

        for n in &self.data {
            out.extend_from_slice(&n.content.to_be_bytes());
        }
        out.extend(self.data.iter().map(|n| n.param1));
        out.extend(self.data.iter().map(|n| n.param2));

        out.extend_from_slice(&(self.metadata.len() as u16).to_be_bytes());
        for (index, fields) in &self.metadata {
            out.extend_from_slice(&index.to_be_bytes());
            out.extend_from_slice(&(fields.len() as u16).to_be_bytes());
            for (key, value) in fields {
                out.extend_from_slice(&(key.len() as u16).to_be_bytes());
                out.extend_from_slice(key.as_bytes());
                out.extend_from_slice(&(value.len() as u32).to_be_bytes());
                out.extend_from_slice(value.as_bytes());
            }
        }
        out
    }

    /// Decodes a block written by `serialize`.
    ///
    /// # Arguments
    /// * `position` - The block coordinates the data belongs to
    /// * `bytes` - The encoded block
    ///
    /// # Returns
    /// The decoded block, or an error describing the first malformed field.
    pub fn deserialize(position: BlockPos, bytes: &[u8]) -> Result<MapBlock> {
        let mut r = Reader { bytes, offset: 0 };
        let version = r.u8()?;
        ensure!(
            version == SERIALIZATION_VERSION,
            "unsupported block version {version}"
        );
        let flags = r.u8()?;

        let contents = r.take(MAP_BLOCK_VOLUME * 2).context("reading content ids")?;
        let param1 = r.take(MAP_BLOCK_VOLUME).context("reading param1")?;
        let param2 = r.take(MAP_BLOCK_VOLUME).context("reading param2")?;
        let data = (0..MAP_BLOCK_VOLUME)
            .map(|i| {
                MapNode::with_params(
                    u16::from_be_bytes([contents[2 * i], contents[2 * i + 1]]),
                    param1[i],
                    param2[i],
                )
            })
            .collect();

        let mut block = MapBlock::new(position);
        block.data = data;
        block.is_underground = flags & FLAG_UNDERGROUND != 0;
        block.lighting_complete = flags & FLAG_LIGHTING_COMPLETE != 0;

        let count = r.u16().context("reading metadata count")?;
        for _ in 0..count {
            let index = r.u16()?;
            ensure!(
                (index as usize) < MAP_BLOCK_VOLUME,
                "metadata index {index} out of range"
            );
            let field_count = r.u16()?;
            let mut fields = NodeMetadata::new();
            for _ in 0..field_count {
                let key_len = r.u16()? as usize;
                let key = r.string(key_len)?;
                let value_len = r.u32()? as usize;
                let value = r.string(value_len)?;
                fields.insert(key, value);
            }
            block.metadata.insert(index, fields);
        }
        ensure!(
            r.offset == bytes.len(),
            "{} trailing bytes after block data",
            bytes.len() - r.offset
        );
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Point3;

    use super::*;
    use crate::engine_state::voxels::block::LightBank;

    #[test]
    fn round_trip_keeps_cells_light_and_metadata() {
        let mut rng = fastrand::Rng::with_seed(7);
        let mut block = MapBlock::filled(Point3::new(-2, 5, 9), MapNode::air());
        for n in block.nodes_mut() {
            *n = MapNode::with_params(rng.u16(0..300), rng.u8(..), rng.u8(..));
        }
        block.nodes_mut()[0].set_light_raw(LightBank::Day, 15);
        block.is_underground = true;
        block.set_metadata_field(Point3::new(1, 1, 1), "text", "hello ünïcode");
        block.set_metadata_field(Point3::new(1, 1, 1), "owner", "kim");

        let decoded = MapBlock::deserialize(block.position, &block.serialize()).unwrap();
        assert_eq!(decoded.nodes(), block.nodes());
        assert!(decoded.is_underground);
        assert!(!decoded.lighting_complete);
        assert_eq!(
            decoded.metadata(Point3::new(1, 1, 1)),
            block.metadata(Point3::new(1, 1, 1))
        );
    }

    #[test]
    fn truncated_and_foreign_data_is_rejected() {
        let block = MapBlock::filled(Point3::new(0, 0, 0), MapNode::air());
        let bytes = block.serialize();
        assert!(MapBlock::deserialize(block.position, &bytes[..100]).is_err());
        let mut wrong_version = bytes.clone();
        wrong_version[0] = 99;
        assert!(MapBlock::deserialize(block.position, &wrong_version).is_err());
        let mut trailing = bytes;
        trailing.push(0);
        assert!(MapBlock::deserialize(block.position, &trailing).is_err());
    }
}
