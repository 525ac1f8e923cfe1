use crate::StorageError;

/// A single byte range, as requested through a `Range` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-end`, both inclusive
    Bounded { start: u64, end: u64 },
    /// `bytes=start-`
    From(u64),
    /// `bytes=-n`, the last n bytes of the file
    Suffix(u64),
}

/// A byte range checked against the length of a file.
/// Both ends are inclusive and inside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Parses the value of a `Range` header.
    /// Multiple ranges are not supported and yield [None], like any malformed value.
    pub fn parse(header: &str) -> Option<Self> {
        let ranges = header.trim().strip_prefix("bytes=")?;

        if ranges.contains(',') {
            return None;
        }

        let (start, end) = ranges.split_once('-')?;
        let (start, end) = (start.trim(), end.trim());

        match (start.is_empty(), end.is_empty()) {
            (true, true) => None,
            (true, false) => end.parse().ok().map(Self::Suffix),
            (false, true) => start.parse().ok().map(Self::From),
            (false, false) => {
                let start = start.parse().ok()?;
                let end = end.parse().ok()?;

                (start <= end).then_some(Self::Bounded { start, end })
            }
        }
    }

    /// Clamps the range to a file of the given length
    pub fn resolve(&self, length: u64) -> Result<ResolvedRange, StorageError> {
        let last = length.saturating_sub(1);

        let (start, end) = match *self {
            Self::Bounded { start, end } => (start, end.min(last)),
            Self::From(start) => (start, last),
            Self::Suffix(0) => return Err(StorageError::RangeNotSatisfiable { length }),
            Self::Suffix(count) => (length.saturating_sub(count), last),
        };

        if length == 0 || start >= length {
            return Err(StorageError::RangeNotSatisfiable { length });
        }

        Ok(ResolvedRange { start, end })
    }
}

impl ResolvedRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// The value of a `Content-Range` header for this range
    pub fn content_range(&self, length: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, length)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_single_ranges() {
        assert_eq!(
            ByteRange::parse("bytes=0-99"),
            Some(ByteRange::Bounded { start: 0, end: 99 })
        );
        assert_eq!(ByteRange::parse("bytes=100-"), Some(ByteRange::From(100)));
        assert_eq!(ByteRange::parse("bytes=-500"), Some(ByteRange::Suffix(500)));
    }

    #[test]
    fn rejects_malformed_ranges() {
        let headers = [
            "bytes=",
            "bytes=-",
            "bytes=9-3",
            "items=0-1",
            "bytes=0-1,4-5",
            "bytes=a-b",
        ];

        for header in headers {
            assert_eq!(ByteRange::parse(header), None, "{header}");
        }
    }

    #[test]
    fn resolves_against_length() {
        let range = ByteRange::Bounded { start: 10, end: 5000 }.resolve(100).unwrap();
        assert_eq!(range, ResolvedRange { start: 10, end: 99 });
        assert_eq!(range.len(), 90);
        assert_eq!(range.content_range(100), "bytes 10-99/100");

        let suffix = ByteRange::Suffix(30).resolve(100).unwrap();
        assert_eq!(suffix, ResolvedRange { start: 70, end: 99 });

        let oversized_suffix = ByteRange::Suffix(300).resolve(100).unwrap();
        assert_eq!(oversized_suffix, ResolvedRange { start: 0, end: 99 });
    }

    #[test]
    fn unsatisfiable_ranges() {
        assert!(ByteRange::From(100).resolve(100).is_err());
        assert!(ByteRange::Suffix(0).resolve(100).is_err());
        assert!(ByteRange::From(0).resolve(0).is_err());
    }
}
