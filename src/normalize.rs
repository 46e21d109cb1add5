use std::sync::LazyLock;

use regex::Regex;

/// Brand dictionary tried in order; only the first Chinese-name hit applies,
/// and both the Chinese and Latin forms are stripped from the description.
const BRANDS: &[(&str, &str)] = &[
    ("天梭", "Tissot"),
    ("美度", "Mido"),
    ("汉米尔顿", "Hamilton"),
    ("宇联", "Union Glashütte"),
    ("帝舵", "Tudor"),
    ("雪铁纳", "Certina"),
    ("尼维达", "Nivada"),
    ("盛时", "PRIME TIME"),
];

/// Jewelry/accessory categories. These never get a watch suffix.
const ACCESSORY_KEYWORDS: &[&str] = &[
    "戒指", "项链", "表带", "珠宝", "吊坠", "耳环", "手链", "手镯", "耳钉", "摆件",
    "保温杯", "帆布袋", "布袋包", "袋", "包", "雨伞", "香薰", "蜡烛", "礼盒", "配件", "定制",
];

const MOVEMENT_KEYWORDS: &[&str] = &["机械", "石英"];

const SERIES: &str = "系列";
const SERIES_MAX_CHARS: usize = 12;

static OPAQUE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{7,}$").unwrap());
// Leftover model codes inside an otherwise Chinese description.
static MODEL_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9.\-]{5,}").unwrap());
static UPPER_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[A-Z\s]{2,}\b").unwrap());
// Dimension annotations like "20x22mm" or "18 X 20 MM".
static DIMENSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\d{1,2}\s*[*xX]\s*\d{1,2}\s*[A-Za-z]+").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// True if the string contains any CJK ideograph (CJK Unified block).
pub fn has_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fa5}').contains(&c))
}

/// Clean a raw product description into a (brand, display name) pair.
///
/// Pure and deterministic; re-running it on an already-normalized name is a
/// no-op because the suffix rules short-circuit on names ending in 表.
pub fn normalize_product_name(raw: &str) -> (Option<&'static str>, String) {
    let trimmed = raw.trim();

    // 7+ digit numerals are opaque codes, not descriptions. Pass through.
    if OPAQUE_CODE_RE.is_match(trimmed) {
        return (None, trimmed.to_string());
    }

    let is_accessory = ACCESSORY_KEYWORDS.iter().any(|kw| trimmed.contains(kw));

    let mut brand = None;
    let mut name = trimmed.to_string();
    for (brand_cn, brand_en) in BRANDS {
        if name.contains(brand_cn) {
            brand = Some(*brand_cn);
            name = name.replace(brand_cn, "").replace(brand_en, "");
            break;
        }
    }

    // If Chinese text remains, long Latin/digit runs and standalone
    // uppercase runs are leftover model codes, not descriptive text.
    if has_cjk(&name) {
        name = MODEL_RUN_RE.replace_all(&name, "").into_owned();
        name = UPPER_RUN_RE.replace_all(&name, "").into_owned();
    }

    name = DIMENSION_RE.replace_all(&name, "").into_owned();
    name = WHITESPACE_RE.replace_all(name.trim(), "").into_owned();

    if let Some(movement) = MOVEMENT_KEYWORDS.iter().find(|m| name.contains(**m)) {
        if !name.contains(SERIES) {
            name = name.replace(movement, &format!("{SERIES}{movement}"));
        }
    }
    if name.contains(SERIES) && name.chars().count() > SERIES_MAX_CHARS {
        name = name.replace(SERIES, "");
    }

    if !is_accessory {
        if name.ends_with('男') || name.ends_with('女') {
            name.push('表');
        } else if !name.is_empty() && !name.ends_with('表') {
            name.push_str("腕表");
        }
    }

    (brand, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_numeric_code_passes_through() {
        let (brand, name) = normalize_product_name(" 1234567 ");
        assert_eq!(brand, None);
        assert_eq!(name, "1234567");
    }

    #[test]
    fn short_numeral_is_not_opaque() {
        let (_, name) = normalize_product_name("123456");
        // Six digits fall through the opaque-code rule and get the suffix.
        assert_eq!(name, "123456腕表");
    }

    #[test]
    fn brand_is_stripped_in_both_forms() {
        let (brand, name) = normalize_product_name("天梭Tissot阿波罗系列男表");
        assert_eq!(brand, Some("天梭"));
        assert_eq!(name, "阿波罗系列男表");
    }

    #[test]
    fn first_brand_in_dictionary_order_wins() {
        let (brand, _) = normalize_product_name("天梭美度联名腕表");
        assert_eq!(brand, Some("天梭"));
    }

    #[test]
    fn model_code_runs_are_stripped_from_chinese_text() {
        let (brand, name) = normalize_product_name("美度贝伦赛丽M7600.4.26.8机械男");
        assert_eq!(brand, Some("美度"));
        assert_eq!(name, "贝伦赛丽系列机械男表");
    }

    #[test]
    fn dimension_annotation_is_stripped() {
        let (brand, name) = normalize_product_name("天梭牛皮表带 20 x 22mm");
        assert_eq!(brand, Some("天梭"));
        assert_eq!(name, "牛皮表带");
    }

    #[test]
    fn movement_gets_series_prefix() {
        let (_, name) = normalize_product_name("先锋石英女");
        assert_eq!(name, "先锋系列石英女表");
    }

    #[test]
    fn long_series_name_drops_series_token() {
        let input = "舵手典藏家传奇超长款系列机械男";
        let (_, name) = normalize_product_name(input);
        assert!(!name.contains("系列"), "got {name}");
        assert!(name.ends_with("男表"));
    }

    #[test]
    fn accessory_gets_no_suffix() {
        let (brand, name) = normalize_product_name("天梭钢制表带");
        assert_eq!(brand, Some("天梭"));
        assert_eq!(name, "钢制表带");
    }

    #[test]
    fn idempotent_on_normalized_names() {
        let (_, once) = normalize_product_name("天梭阿波罗系列男表");
        let (_, twice) = normalize_product_name(&once);
        assert_eq!(once, twice);
        assert_eq!(once, "阿波罗系列男表");
    }

    #[test]
    fn empty_input_stays_empty() {
        let (brand, name) = normalize_product_name("   ");
        assert_eq!(brand, None);
        assert_eq!(name, "");
    }
}
