//! Human-readable descriptions of standard keywords.
//!
//! Used for diagnostics and listings only; parsing never consults it.

/// Keyword descriptions, sorted by keyword.
static KEYWORDS: &[(&str, &str)] = &[
    ("AUTHOR", "author of the data"),
    ("BITPIX", "number of bits per data value"),
    ("BLANK", "value used for undefined array elements"),
    ("BSCALE", "linear factor in scaling equation"),
    ("BUNIT", "physical unit of the array values"),
    ("BZERO", "zero point in scaling equation"),
    ("COMMENT", "descriptive comment"),
    ("CONTINUE", "continuation of the previous string value"),
    ("DATAMAX", "maximum data value"),
    ("DATAMIN", "minimum data value"),
    ("DATE", "date the HDU was created"),
    ("DATE-OBS", "date of the observation"),
    ("END", "end of header"),
    ("EQUINOX", "equinox of celestial coordinate system"),
    ("EXTEND", "file may contain extensions"),
    ("EXTLEVEL", "hierarchical level of the extension"),
    ("EXTNAME", "name of the extension"),
    ("EXTVER", "version of the extension"),
    ("GCOUNT", "number of groups"),
    ("GROUPS", "random groups structure"),
    ("HISTORY", "processing history"),
    ("INSTRUME", "instrument used to acquire the data"),
    ("NAXIS", "number of data axes"),
    ("OBJECT", "name of the observed object"),
    ("OBSERVER", "observer who acquired the data"),
    ("ORIGIN", "organization that created the file"),
    ("PCOUNT", "number of parameters or size of heap"),
    ("REFERENC", "bibliographic reference"),
    ("SIMPLE", "file conforms to the FITS standard"),
    ("TELESCOP", "telescope used to acquire the data"),
    ("TFIELDS", "number of fields per table row"),
    ("THEAP", "byte offset of the heap"),
    ("XTENSION", "type of extension"),
];

/// Descriptions of indexed keywords, by root.
static INDEXED: &[(&str, &str)] = &[
    ("NAXIS", "length of data axis"),
    ("TBCOL", "starting column of field"),
    ("TDIM", "dimensions of field"),
    ("TDISP", "display format of field"),
    ("TFORM", "data format of field"),
    ("TNULL", "undefined value of field"),
    ("TSCAL", "linear factor for field"),
    ("TTYPE", "name of field"),
    ("TUNIT", "physical unit of field"),
    ("TZERO", "zero point for field"),
];

fn lookup(table: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .binary_search_by(|(k, _)| (*k).cmp(key))
        .ok()
        .map(|i| table[i].1)
}

/// Describe `keyword`, e.g. `NAXIS2` -> `"length of data axis 2"`.
pub fn describe(keyword: &str) -> Option<String> {
    let keyword = keyword.trim().to_ascii_uppercase();
    if let Some(text) = lookup(KEYWORDS, &keyword) {
        return Some(text.to_string());
    }
    let root = keyword.trim_end_matches(|c: char| c.is_ascii_digit());
    let index = &keyword[root.len()..];
    if index.is_empty() {
        return None;
    }
    lookup(INDEXED, root).map(|text| format!("{text} {index}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_sorted() {
        assert!(KEYWORDS.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(INDEXED.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn plain_and_indexed() {
        assert_eq!(describe("bitpix").as_deref(), Some("number of bits per data value"));
        assert_eq!(describe("NAXIS").as_deref(), Some("number of data axes"));
        assert_eq!(describe("NAXIS2").as_deref(), Some("length of data axis 2"));
        assert_eq!(describe("TFORM12").as_deref(), Some("data format of field 12"));
        assert_eq!(describe("TFORM"), None);
        assert_eq!(describe("MYKEY"), None);
    }
}
