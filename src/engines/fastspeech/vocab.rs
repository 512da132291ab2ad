use std::collections::HashMap;
use std::path::Path;

use super::model::FastSpeechError;

/// Symbol name of the end-of-sequence marker every encoded utterance ends with.
pub const EOS_SYMBOL: &str = "eos";

/// Bidirectional mapping between text symbols and model token ids.
///
/// Loaded once at startup from the two mapper files shipped with the model
/// (`symbol_to_id.json` and `id_to_symbol.json`) and immutable thereafter.
/// Symbols are single-character strings plus named tokens such as `"eos"`.
#[derive(Debug)]
pub struct SymbolVocabulary {
    symbol_to_id: HashMap<String, i32>,
    id_to_symbol: HashMap<i32, String>,
    eos_id: i32,
}

impl SymbolVocabulary {
    /// Load the vocabulary from the two JSON mapper files.
    ///
    /// `symbol_to_id_path` must contain a `{symbol: int}` object and
    /// `id_to_symbol_path` its `{"<int>": symbol}` inverse. Any schema
    /// violation fails here, at load time, never lazily during encoding.
    pub fn load(
        symbol_to_id_path: &Path,
        id_to_symbol_path: &Path,
    ) -> Result<Self, FastSpeechError> {
        let symbol_to_id = std::fs::read_to_string(symbol_to_id_path)?;
        let id_to_symbol = std::fs::read_to_string(id_to_symbol_path)?;
        Self::from_json_str(&symbol_to_id, &id_to_symbol)
    }

    /// Build the vocabulary from in-memory JSON strings.
    pub fn from_json_str(
        symbol_to_id_json: &str,
        id_to_symbol_json: &str,
    ) -> Result<Self, FastSpeechError> {
        let symbol_to_id = parse_symbol_to_id(symbol_to_id_json)?;
        let id_to_symbol = parse_id_to_symbol(id_to_symbol_json)?;

        // The two mapper files ship as a pair; a one-sided entry means the
        // model export is broken, so refuse it up front.
        for (symbol, id) in &symbol_to_id {
            match id_to_symbol.get(id) {
                Some(back) if back == symbol => {}
                Some(back) => {
                    return Err(FastSpeechError::VocabLoad(format!(
                        "id {id} maps back to {back:?}, expected {symbol:?}"
                    )))
                }
                None => {
                    return Err(FastSpeechError::VocabLoad(format!(
                        "symbol {symbol:?} (id {id}) missing from id_to_symbol"
                    )))
                }
            }
        }

        let eos_id = *symbol_to_id.get(EOS_SYMBOL).ok_or_else(|| {
            FastSpeechError::VocabLoad(format!("missing {EOS_SYMBOL:?} entry"))
        })?;

        log::info!("Loaded vocabulary with {} symbols", symbol_to_id.len());

        Ok(Self {
            symbol_to_id,
            id_to_symbol,
            eos_id,
        })
    }

    /// Look up the token id for a symbol. Unknown symbols yield `None`.
    pub fn id(&self, symbol: &str) -> Option<i32> {
        self.symbol_to_id.get(symbol).copied()
    }

    /// Look up the symbol for a token id.
    pub fn symbol(&self, id: i32) -> Option<&str> {
        self.id_to_symbol.get(&id).map(|s| s.as_str())
    }

    /// The id of the end-of-sequence marker, validated present at load.
    pub fn eos_id(&self) -> i32 {
        self.eos_id
    }

    /// Render an id sequence back to its symbols, space-separated.
    ///
    /// Ids without a mapping are skipped. Diagnostic helper, not part of the
    /// synthesis path.
    pub fn decode(&self, ids: &[i32]) -> String {
        ids.iter()
            .filter_map(|&id| self.symbol(id))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Number of symbols in the vocabulary.
    pub fn len(&self) -> usize {
        self.symbol_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbol_to_id.is_empty()
    }
}

fn parse_symbol_to_id(json: &str) -> Result<HashMap<String, i32>, FastSpeechError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| FastSpeechError::VocabLoad(format!("symbol_to_id is not valid JSON: {e}")))?;
    let object = value.as_object().ok_or_else(|| {
        FastSpeechError::VocabLoad("symbol_to_id must be a JSON object".to_string())
    })?;

    let mut map = HashMap::with_capacity(object.len());
    for (symbol, id) in object {
        let id = id
            .as_i64()
            .and_then(|id| i32::try_from(id).ok())
            .ok_or_else(|| {
                FastSpeechError::VocabLoad(format!("non-int32 id for symbol {symbol:?}: {id}"))
            })?;
        map.insert(symbol.clone(), id);
    }
    Ok(map)
}

fn parse_id_to_symbol(json: &str) -> Result<HashMap<i32, String>, FastSpeechError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| FastSpeechError::VocabLoad(format!("id_to_symbol is not valid JSON: {e}")))?;
    let object = value.as_object().ok_or_else(|| {
        FastSpeechError::VocabLoad("id_to_symbol must be a JSON object".to_string())
    })?;

    let mut map = HashMap::with_capacity(object.len());
    for (id, symbol) in object {
        let id: i32 = id.parse().map_err(|_| {
            FastSpeechError::VocabLoad(format!("non-integer key in id_to_symbol: {id:?}"))
        })?;
        let symbol = symbol.as_str().ok_or_else(|| {
            FastSpeechError::VocabLoad(format!("non-string symbol for id {id}"))
        })?;
        map.insert(id, symbol.to_string());
    }
    Ok(map)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal LJSpeech-style vocabulary shared by the pipeline tests.
    pub(crate) fn test_vocab() -> SymbolVocabulary {
        SymbolVocabulary::from_json_str(
            r#"{"h": 1, "i": 2, "e": 3, "l": 4, "o": 5, " ": 6, "t": 7, "w": 8, "eos": 9}"#,
            r#"{"1": "h", "2": "i", "3": "e", "4": "l", "5": "o", "6": " ", "7": "t", "8": "w", "9": "eos"}"#,
        )
        .expect("test vocabulary should load")
    }

    #[test]
    fn loads_well_formed_tables() {
        let vocab = test_vocab();
        assert_eq!(vocab.len(), 9);
        assert_eq!(vocab.id("h"), Some(1));
        assert_eq!(vocab.symbol(5), Some("o"));
        assert_eq!(vocab.eos_id(), 9);
    }

    #[test]
    fn rejects_malformed_json() {
        let err = SymbolVocabulary::from_json_str("not json", "{}").unwrap_err();
        assert!(matches!(err, FastSpeechError::VocabLoad(_)));
    }

    #[test]
    fn rejects_non_object_tables() {
        let err = SymbolVocabulary::from_json_str("[1, 2]", "{}").unwrap_err();
        assert!(matches!(err, FastSpeechError::VocabLoad(_)));
    }

    #[test]
    fn rejects_non_integer_ids() {
        let err = SymbolVocabulary::from_json_str(r#"{"a": "x"}"#, r#"{}"#).unwrap_err();
        assert!(matches!(err, FastSpeechError::VocabLoad(_)));
    }

    #[test]
    fn rejects_inconsistent_tables() {
        let err = SymbolVocabulary::from_json_str(
            r#"{"a": 1, "eos": 2}"#,
            r#"{"1": "b", "2": "eos"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, FastSpeechError::VocabLoad(_)));
    }

    #[test]
    fn rejects_missing_eos() {
        let err =
            SymbolVocabulary::from_json_str(r#"{"a": 1}"#, r#"{"1": "a"}"#).unwrap_err();
        assert!(matches!(err, FastSpeechError::VocabLoad(_)));
    }

    #[test]
    fn decode_skips_unknown_ids() {
        let vocab = test_vocab();
        assert_eq!(vocab.decode(&[1, 2, 99, 9]), "h i eos");
    }
}
