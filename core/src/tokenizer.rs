use crate::schema::{Language, Schema};
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::Stemmer;
use unicode_normalization::UnicodeNormalization;
use std::collections::{BTreeMap, HashSet};

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// One analyzed token: the normalized surface word, its stem and its ordinal
/// in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub word: String,
    pub term: String,
    pub position: usize,
}

/// Language-aware analyzer. Index time and query time must use the same one.
pub struct Analyzer {
    language: Language,
    stemmer: Stemmer,
}

impl Analyzer {
    pub fn new(language: Language) -> Self {
        Self { language, stemmer: Stemmer::create(language.algorithm()) }
    }

    fn is_stopword(&self, token: &str) -> bool {
        self.language == Language::English && STOPWORDS.contains(token)
    }

    /// Tokenize using NFKC normalization, lowercase, stopword removal and
    /// stemming. Positions count stopwords so phrase gaps survive removal.
    pub fn tokens(&self, text: &str) -> Vec<Token> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        let mut tokens = Vec::new();
        for (pos, mat) in RE.find_iter(&normalized).enumerate() {
            let word = mat.as_str();
            if self.is_stopword(word) { continue; }
            let term = self.stemmer.stem(word).to_string();
            tokens.push(Token { word: word.to_string(), term, position: pos });
        }
        tokens
    }

    /// Tokenize text into (term, position).
    pub fn analyze(&self, text: &str) -> Vec<(String, usize)> {
        self.tokens(text).into_iter().map(|t| (t.term, t.position)).collect()
    }
}

/// Analyzers for every free-text field of a schema.
pub struct FieldAnalyzers {
    fields: BTreeMap<String, (Analyzer, bool)>,
}

impl FieldAnalyzers {
    pub fn new(schema: &Schema) -> Self {
        let fields = schema
            .freetext_fields()
            .map(|(name, opts)| (name.to_string(), (Analyzer::new(opts.language), opts.spell)))
            .collect();
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Analyzer> {
        self.fields.get(field).map(|(analyzer, _)| analyzer)
    }

    pub fn spell_enabled(&self, field: &str) -> bool {
        self.fields.get(field).map(|(_, spell)| *spell).unwrap_or(false)
    }

    /// Fields searched for unqualified query words.
    pub fn default_fields(&self) -> impl Iterator<Item = (&str, &Analyzer)> {
        self.fields.iter().map(|(name, (analyzer, _))| (name.as_str(), analyzer))
    }
}

/// Byte ranges of the words in `text`, without normalization.
pub fn word_spans(text: &str) -> impl Iterator<Item = (usize, usize)> + '_ {
    RE.find_iter(text).map(|m| (m.start(), m.end()))
}

/// English analysis, the default for file content.
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    Analyzer::new(Language::English).analyze(text)
}
