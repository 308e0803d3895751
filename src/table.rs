use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::Result;
use crate::types::GlobalMap;

const FILE_MAGIC: &[u8] = b"MTXMAP01";

/// Writes a finished global map as a flat `(u64 key, u64 value)` table
/// behind a magic header, little endian.
pub fn write_table<P: AsRef<Path>>(map: &GlobalMap, path: P) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(FILE_MAGIC)?;
    w.write_u64::<LittleEndian>(map.len() as u64)?;
    for (&key, &value) in map {
        w.write_u64::<LittleEndian>(key)?;
        w.write_u64::<LittleEndian>(value)?;
    }
    w.flush()?;
    Ok(())
}

pub fn load_table<P: AsRef<Path>>(path: P) -> Result<GlobalMap> {
    let mut r = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if magic != FILE_MAGIC {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "invalid map table file format",
        )
        .into());
    }
    let count = r.read_u64::<LittleEndian>()?;
    let mut map = GlobalMap::with_capacity(count as usize);
    for _ in 0..count {
        let key = r.read_u64::<LittleEndian>()?;
        let value = r.read_u64::<LittleEndian>()?;
        map.insert(key, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_roundtrip() {
        let map = GlobalMap::from_iter([(1u64, 10u64), (2, 20), (0xdead_beef, 3)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.bin");
        write_table(&map, &path).unwrap();
        assert_eq!(load_table(&path).unwrap(), map);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.bin");
        std::fs::write(&path, b"NOTAMAP!........").unwrap();
        assert!(load_table(&path).is_err());
    }
}
