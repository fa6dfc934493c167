//! Grouping of placement chunks into ordered meta-chunks, and their sizing.

use crate::error::SdkError;
use crate::types::Chunk;

/// A contiguous byte range of the object, covered by data chunks plus
/// optional parity. Client-side only, never on the wire.
#[derive(Debug, Clone, Default)]
pub struct MetaChunk {
    pub offset: u64,
    pub size: u64,
    pub data: Vec<Chunk>,
    pub parity: Vec<Chunk>,
}

/// Parsed `meta[.intra[p]]` chunk position. Malformed numbers fold to 0, the
/// proxy owns the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Position {
    meta: u32,
    intra: u32,
    parity: bool,
}

fn parse_position(pos: &str) -> Position {
    let (meta, rest) = match pos.split_once('.') {
        Some((meta, rest)) => (meta, Some(rest)),
        None => (pos, None),
    };
    let meta = meta.parse().unwrap_or(0);
    match rest {
        None => Position {
            meta,
            intra: 0,
            parity: false,
        },
        Some(rest) => {
            let parity = rest.ends_with('p');
            let intra = rest.strip_suffix('p').unwrap_or(rest).parse().unwrap_or(0);
            Position {
                meta,
                intra,
                parity,
            }
        }
    }
}

/// Sort the chunks by position (meta, then intra, data before parity) and
/// group contiguous-meta runs.
pub fn organize(chunks: &[Chunk]) -> Vec<MetaChunk> {
    let mut positioned: Vec<(Position, &Chunk)> = chunks
        .iter()
        .map(|c| (parse_position(&c.position), c))
        .collect();
    positioned.sort_by_key(|(p, _)| *p);

    let mut out: Vec<MetaChunk> = Vec::new();
    let mut current_meta = None;
    for (pos, chunk) in positioned {
        if current_meta != Some(pos.meta) {
            out.push(MetaChunk::default());
            current_meta = Some(pos.meta);
        }
        let mc = out.last_mut().unwrap();
        if pos.parity {
            mc.parity.push(chunk.clone());
        } else {
            mc.data.push(chunk.clone());
        }
    }
    out
}

/// Full write-path planning: organize, refuse erasure coding, then size each
/// meta-chunk as `min(remaining, cap)` where the cap is the largest chunk
/// size the placement advertised.
pub fn plan(chunks: &[Chunk], object_size: u64) -> Result<Vec<MetaChunk>, SdkError> {
    let mut metas = organize(chunks);

    if metas.iter().any(|mc| !mc.parity.is_empty()) {
        return Err(SdkError::Unimplemented("erasure coding"));
    }

    let cap = chunks.iter().map(|c| c.size).max().unwrap_or(0);
    let mut offset = 0u64;
    let mut remaining = object_size;
    for mc in &mut metas {
        mc.size = remaining.min(cap);
        remaining -= mc.size;
        mc.offset = offset;
        offset += mc.size;
        for chunk in &mut mc.data {
            chunk.size = mc.size;
        }
    }
    Ok(metas)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(position: &str, size: u64) -> Chunk {
        Chunk {
            url: format!("http://node/{position}"),
            position: position.to_string(),
            size,
            hash: String::new(),
        }
    }

    #[test]
    fn test_parse_position() {
        assert_eq!(
            parse_position("0"),
            Position { meta: 0, intra: 0, parity: false }
        );
        assert_eq!(
            parse_position("3.2"),
            Position { meta: 3, intra: 2, parity: false }
        );
        assert_eq!(
            parse_position("1.0p"),
            Position { meta: 1, intra: 0, parity: true }
        );
    }

    #[test]
    fn test_organize_sorts_and_groups() {
        let chunks = vec![
            chunk("1.0", 0),
            chunk("0.1", 0),
            chunk("0.0", 0),
            chunk("1.0p", 0),
            chunk("1.1", 0),
        ];
        let metas = organize(&chunks);
        assert_eq!(metas.len(), 2);

        let positions = |v: &[Chunk]| v.iter().map(|c| c.position.clone()).collect::<Vec<_>>();
        assert_eq!(positions(&metas[0].data), vec!["0.0", "0.1"]);
        assert!(metas[0].parity.is_empty());
        assert_eq!(positions(&metas[1].data), vec!["1.0", "1.1"]);
        assert_eq!(positions(&metas[1].parity), vec!["1.0p"]);
    }

    #[test]
    fn test_plan_sizes_meta_chunks() {
        // 9000 bytes over 3 meta-chunks capped at 4096.
        let chunks = vec![chunk("0", 4096), chunk("1", 4096), chunk("2", 4096)];
        let metas = plan(&chunks, 9000).unwrap();
        assert_eq!(metas.len(), 3);
        assert_eq!(
            metas.iter().map(|m| m.size).collect::<Vec<_>>(),
            vec![4096, 4096, 808]
        );
        assert_eq!(
            metas.iter().map(|m| m.offset).collect::<Vec<_>>(),
            vec![0, 4096, 8192]
        );
        assert_eq!(metas.iter().map(|m| m.size).sum::<u64>(), 9000);
        // Data chunk sizes are overwritten with the meta-chunk size.
        assert_eq!(metas[2].data[0].size, 808);
    }

    #[test]
    fn test_plan_exact_multiple() {
        let chunks = vec![chunk("0", 4096), chunk("1", 4096)];
        let metas = plan(&chunks, 8192).unwrap();
        assert_eq!(
            metas.iter().map(|m| m.size).collect::<Vec<_>>(),
            vec![4096, 4096]
        );
    }

    #[test]
    fn test_plan_refuses_parity() {
        let chunks = vec![chunk("0.0", 1024), chunk("0.0p", 1024)];
        assert!(matches!(
            plan(&chunks, 512),
            Err(SdkError::Unimplemented(_))
        ));
    }
}
