// 🧹 Canonicalizer - Comparison-ready names and addresses
//
// "J.C. Reyes Construction Co., Inc." and "JC REYES CONSTRUCTION" must look the
// same to the similarity scorer. Order of operations:
//   1. Unicode NFKC
//   2. Case-fold
//   3. Punctuation → space, whitespace collapsed
//   4. Trailing legal suffix tokens removed (repeatedly, never the last token)
//
// Output only ever contains lowercase alphanumeric tokens joined by single
// spaces, which is what makes canonicalize(canonicalize(x)) == canonicalize(x).

use unicode_normalization::UnicodeNormalization;

/// Trailing tokens stripped from organisation names
const LEGAL_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "corp",
    "corporation",
    "co",
    "company",
    "ltd",
    "limited",
    "llc",
    "pte",
    "pvt",
    "plc",
];

/// Generational suffixes dropped from person names
const GENERATIONAL_SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv"];

/// Particles that belong to a Filipino/Spanish surname ("dela Cruz", "delos Santos")
const SURNAME_PARTICLES: &[&str] = &[
    "de", "del", "dela", "delos", "delas", "san", "santa", "sta", "di", "da", "van", "von",
];

// ============================================================================
// ORGANISATIONS + ADDRESSES
// ============================================================================

/// Canonicalize an entity name or address.
///
/// Empty or whitespace-only input yields `""`, which callers must treat as
/// unmatchable.
pub fn canonicalize(raw: &str) -> String {
    let mut tokens = fold_tokens(raw);
    strip_legal_suffixes(&mut tokens);
    tokens.join(" ")
}

/// First canonical token, used as the cheap blocking key
pub fn blocking_token(canonical: &str) -> Option<&str> {
    canonical.split(' ').find(|t| !t.is_empty())
}

/// Registration numbers compare on their alphanumeric characters only
/// ("PCAB-12-3456" == "pcab 123456")
pub fn canonicalize_registration(raw: &str) -> String {
    raw.nfkc()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn fold_tokens(raw: &str) -> Vec<String> {
    let folded: String = raw
        .nfkc()
        .collect::<String>()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    folded.split_whitespace().map(str::to_string).collect()
}

fn strip_legal_suffixes(tokens: &mut Vec<String>) {
    while tokens.len() > 1 {
        let last = tokens[tokens.len() - 1].as_str();
        if !LEGAL_SUFFIXES.contains(&last) {
            break;
        }
        let was_company = last == "co" || last == "company";
        tokens.pop();

        // "& Co." leaves nothing behind, "and Co." leaves a dangling "and"
        if was_company && tokens.len() > 1 && tokens[tokens.len() - 1] == "and" {
            tokens.pop();
        }
    }
}

// ============================================================================
// PERSONS
// ============================================================================

/// Canonicalize a person's name for owner/politician matching.
///
/// "DELA CRUZ, Juan Jr." and "Juan De La Cruz" both become "juan dela cruz":
/// comma form is reordered to given-then-surname, generational suffixes are
/// dropped and "de la"/"de los"/"de las" are folded.
pub fn canonicalize_person(raw: &str) -> String {
    let mut tokens = match raw.split_once(',') {
        Some((surname, given)) => {
            let mut t = fold_tokens(given);
            t.extend(fold_tokens(surname));
            t
        }
        None => fold_tokens(raw),
    };

    tokens.retain(|t| !GENERATIONAL_SUFFIXES.contains(&t.as_str()));
    fold_particles(tokens).join(" ")
}

/// Extract the canonical surname, keeping its particles ("dela cruz").
pub fn surname_of(raw: &str) -> String {
    let canonical = canonicalize_person(raw);
    let tokens: Vec<&str> = canonical.split(' ').filter(|t| !t.is_empty()).collect();

    let Some(last) = tokens.len().checked_sub(1) else {
        return String::new();
    };

    let mut start = last;
    while start > 0 && SURNAME_PARTICLES.contains(&tokens[start - 1]) {
        start -= 1;
    }
    // A name made only of particles + one token keeps the last token alone
    if start == 0 && tokens.len() > 1 {
        start = last;
    }

    tokens[start..].join(" ")
}

fn fold_particles(tokens: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
        if token == "de" {
            let merged = match iter.peek().map(String::as_str) {
                Some("la") => Some("dela"),
                Some("los") => Some("delos"),
                Some("las") => Some("delas"),
                _ => None,
            };
            if let Some(merged) = merged {
                iter.next();
                out.push(merged.to_string());
                continue;
            }
        }
        out.push(token);
    }

    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_legal_suffixes_stripped() {
        assert_eq!(canonicalize("ABC Construction, Inc."), "abc construction");
        assert_eq!(canonicalize("ABC Construction Corp"), "abc construction");
        assert_eq!(canonicalize("Goldman Sachs & Co."), "goldman sachs");
        assert_eq!(canonicalize("Reyes and Co."), "reyes");
        assert_eq!(canonicalize("Mega Builders Co., Ltd."), "mega builders");
    }

    #[test]
    fn test_suffix_only_inside_name_kept() {
        assert_eq!(canonicalize("Inc Trading Supply"), "inc trading supply");
        // never strip down to nothing
        assert_eq!(canonicalize("Corporation"), "corporation");
    }

    #[test]
    fn test_punctuation_and_whitespace_collapse() {
        assert_eq!(
            canonicalize("  J.C.   Reyes -- Builders!!  "),
            "j c reyes builders"
        );
    }

    #[test]
    fn test_unicode_normalized() {
        // full-width letters fold to ASCII under NFKC
        assert_eq!(canonicalize("ＡＢＣ Builders"), "abc builders");
        assert_eq!(canonicalize("Peñafrancia Corp"), canonicalize("PEÑAFRANCIA CORP."));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(canonicalize(""), "");
        assert_eq!(canonicalize("   \t "), "");
        assert_eq!(canonicalize("..,,"), "");
        assert_eq!(blocking_token(""), None);
    }

    #[test]
    fn test_registration_canonical() {
        assert_eq!(
            canonicalize_registration("PCAB-12-3456"),
            canonicalize_registration("pcab 123456")
        );
    }

    #[test]
    fn test_person_comma_form_matches_natural_form() {
        assert_eq!(canonicalize_person("DELA CRUZ, Juan Jr."), "juan dela cruz");
        assert_eq!(canonicalize_person("Juan De La Cruz"), "juan dela cruz");
        assert_eq!(canonicalize_person("Ampatuan, Andal Sr."), "andal ampatuan");
    }

    #[test]
    fn test_surname_extraction() {
        assert_eq!(surname_of("Juan De La Cruz"), "dela cruz");
        assert_eq!(surname_of("DELA CRUZ, Juan"), "dela cruz");
        assert_eq!(surname_of("Maria Santos III"), "santos");
        assert_eq!(surname_of("Estrada"), "estrada");
        assert_eq!(surname_of(""), "");
    }

    proptest! {
        #[test]
        fn canonicalize_is_idempotent(s in "[ -~À-ɏ]{0,60}") {
            let once = canonicalize(&s);
            prop_assert_eq!(canonicalize(&once), once.clone());
        }

        #[test]
        fn canonicalize_person_is_idempotent(s in "[ -~À-ɏ]{0,60}") {
            let once = canonicalize_person(&s);
            prop_assert_eq!(canonicalize_person(&once), once.clone());
        }
    }
}
