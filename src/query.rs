//! Decides whether a query deserves an AI answer.
//!
//! Pure string matching over English and Japanese phrase lists; no I/O.

/// Phrases that mark an explanatory question (English, matched on lowercase).
const AI_KEYWORDS: &[&str] = &[
    "what is", "who is", "when did", "where is", "why does", "why is",
    "how to", "how does", "how can", "how do", "how are", "how was",
    "explain", "define", "compare", "difference between", "best way to",
    "pros and cons", "advantages and disadvantages", "what are the",
    "tell me about", "describe", "summarize", "overview of",
];

const AI_KEYWORDS_JA: &[&str] = &[
    "とは", "とは何", "とは何ですか", "とは何でしょうか", "とは何か",
    "誰", "いつ", "どこ", "なぜ", "どうして", "どのように", "どうやって",
    "説明", "定義", "比較", "違い", "違いは", "違いについて",
    "方法", "やり方", "仕方", "手順", "手順は", "手順について",
    "教えて", "教えてください", "教えて下さい", "教えてもらえますか",
    "について", "について教えて", "について説明", "について詳しく",
    "まとめ", "要約", "概要", "概要を", "概要について",
    "メリット", "デメリット", "利点", "欠点", "長所", "短所",
    "おすすめ", "お勧め", "推奨", "ベスト", "最適", "最良",
];

const QUESTION_WORDS: &[&str] = &["what", "who", "when", "where", "why", "how"];

const QUESTION_WORDS_JA: &[&str] = &["何", "誰", "いつ", "どこ", "なぜ", "どうして", "どの", "どれ", "どちら"];

const COMPARISON_WORDS: &[&str] = &["vs", "versus", "compared to", "better than", "worse than"];

const COMPARISON_WORDS_JA: &[&str] = &["対", "比較", "違い", "どちら", "どっち", "vs", "VS"];

const QUESTION_PARTICLES_JA: &[&str] = &["か", "ですか", "でしょうか", "ですか？", "でしょうか？"];

/// Search operators that mean the user wants raw results.
const SKIP_PREFIXES: &[&str] = &["site:", "filetype:", "intitle:", "inurl:", "related:", "cache:"];

const ADULT_KEYWORDS: &[&str] = &[
    "porn", "pornography", "sex", "sexual", "nude", "naked", "breast", "boob", "boobs",
    "penis", "vagina", "orgasm", "masturbat", "fetish", "bdsm", "xxx", "adult",
    "erotic", "intimate", "genital", "explicit", "nsfw", "hentai", "ecchi",
];

const ADULT_KEYWORDS_JA: &[&str] = &[
    "おパイ", "おっぱい", "パイ", "ちんこ", "まんこ", "エッチ", "エロ", "ポルノ",
    "アダルト", "AV", "アブノーマル", "変態", "痴漢", "レイプ", "SM", "BDSM",
    "フェチ", "コスプレ", "ロリ", "ショタ", "巨乳", "貧乳", "美少女", "美少年",
    "セックス", "性交", "性行為", "自慰", "オナニー", "マスターベーション",
    "裸", "ヌード", "下着", "パンツ", "ブラジャー", "乳首", "陰部", "性器",
];

/// True if the query contains Hiragana, Katakana or CJK ideographs.
pub fn is_japanese(query: &str) -> bool {
    query.chars().any(|c| {
        matches!(c, '\u{3040}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}' | '\u{4E00}'..='\u{9FAF}')
    })
}

pub fn contains_adult_content(query: &str) -> bool {
    let original = query.trim();
    let normalized = original.to_lowercase();
    ADULT_KEYWORDS.iter().any(|k| normalized.contains(k))
        || ADULT_KEYWORDS_JA.iter().any(|k| original.contains(k))
}

/// Looks like `example.com` or `docs.rs`: dotted labels with an alphabetic TLD.
fn is_bare_domain(query: &str) -> bool {
    let Some((head, tld)) = query.rsplit_once('.') else {
        return false;
    };
    !head.is_empty()
        && head
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        && tld.len() >= 2
        && tld.chars().all(|c| c.is_ascii_alphabetic())
}

/// Whether the query should trigger an AI answer.
pub fn should_use_ai(query: &str) -> bool {
    let original = query.trim();
    let normalized = original.to_lowercase();

    if normalized.chars().count() < 2 {
        return false;
    }
    if contains_adult_content(query) {
        return false;
    }
    if SKIP_PREFIXES.iter().any(|p| normalized.starts_with(p)) {
        return false;
    }
    if normalized.starts_with("http://")
        || normalized.starts_with("https://")
        || is_bare_domain(&normalized)
    {
        return false;
    }

    AI_KEYWORDS.iter().any(|k| normalized.contains(k))
        || AI_KEYWORDS_JA.iter().any(|k| original.contains(k))
        || QUESTION_WORDS
            .iter()
            .any(|w| normalized.starts_with(&format!("{w} ")))
        || QUESTION_WORDS_JA.iter().any(|w| original.contains(w))
        || normalized.contains('?')
        || original.contains('？')
        || COMPARISON_WORDS.iter().any(|w| normalized.contains(w))
        || COMPARISON_WORDS_JA.iter().any(|w| original.contains(w))
        || QUESTION_PARTICLES_JA.iter().any(|p| original.ends_with(p))
}
