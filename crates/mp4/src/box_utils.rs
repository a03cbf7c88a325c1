use bytes::Bytes;

/// Parsed view over a single ISOBMFF box inside a parent byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BoxView {
    pub(crate) end: usize,
    pub(crate) fourcc: [u8; 4],
    pub(crate) body_start: usize,
    pub(crate) body_end: usize,
}

impl BoxView {
    pub(crate) fn body<'a>(&self, data: &'a Bytes) -> &'a [u8] {
        &data[self.body_start..self.body_end]
    }
}

/// Read a box header: returns `(total_box_size, fourcc, header_size)`.
///
/// Handles 32-bit size, 64-bit extended size (`size == 1`),
/// and box-extends-to-EOF (`size == 0`).
pub(crate) fn read_box_header(data: &[u8]) -> Option<(usize, [u8; 4], usize)> {
    if data.len() < 8 {
        return None;
    }

    let size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as u64;
    let fourcc: [u8; 4] = [data[4], data[5], data[6], data[7]];

    match size {
        1 => {
            if data.len() < 16 {
                return None;
            }
            let ext_size = u64::from_be_bytes([
                data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
            ]);
            Some((usize::try_from(ext_size).ok()?, fourcc, 16))
        }
        0 => Some((data.len(), fourcc, 8)),
        _ => Some((size as usize, fourcc, 8)),
    }
}

/// Parse a single box located at `offset` within `[0..end)`.
///
/// Returns `None` when the header is truncated or the declared size runs past
/// `end`, which is the normal outcome for a box cut off by a range request.
pub(crate) fn box_at(data: &Bytes, offset: usize, end: usize) -> Option<BoxView> {
    if offset >= end {
        return None;
    }

    let (size, fourcc, header_size) = read_box_header(&data[offset..end])?;
    if size < header_size || offset.checked_add(size)? > end {
        return None;
    }

    Some(BoxView {
        end: offset + size,
        fourcc,
        body_start: offset + header_size,
        body_end: offset + size,
    })
}

/// Iterator over the sibling boxes of `[start..end)`.
pub(crate) struct Children<'a> {
    data: &'a Bytes,
    offset: usize,
    end: usize,
}

impl Iterator for Children<'_> {
    type Item = BoxView;

    fn next(&mut self) -> Option<BoxView> {
        let parsed = box_at(self.data, self.offset, self.end)?;
        self.offset = parsed.end;
        Some(parsed)
    }
}

pub(crate) fn children(data: &Bytes, start: usize, end: usize) -> Children<'_> {
    Children {
        data,
        offset: start,
        end,
    }
}

/// Find the first child box with the given FourCC inside `[start..end)`.
pub(crate) fn find_first_box(
    data: &Bytes,
    start: usize,
    end: usize,
    target: [u8; 4],
) -> Option<BoxView> {
    children(data, start, end).find(|parsed| parsed.fourcc == target)
}

/// Big-endian field reader over a box body.
pub(crate) struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn skip(&mut self, n: usize) -> Option<()> {
        let next = self.pos.checked_add(n)?;
        if next > self.buf.len() {
            return None;
        }
        self.pos = next;
        Some(())
    }

    pub(crate) fn u8(&mut self) -> Option<u8> {
        let value = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(value)
    }

    pub(crate) fn u32(&mut self) -> Option<u32> {
        let bytes = self.buf.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn i32(&mut self) -> Option<i32> {
        self.u32().map(|v| v as i32)
    }

    pub(crate) fn u64(&mut self) -> Option<u64> {
        let hi = self.u32()? as u64;
        let lo = self.u32()? as u64;
        Some((hi << 32) | lo)
    }

    pub(crate) fn fourcc(&mut self) -> Option<[u8; 4]> {
        let bytes = self.buf.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}
