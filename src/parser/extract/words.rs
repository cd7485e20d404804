/// Magnitude class of a number word. Words in a compound must appear in
/// strictly decreasing rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Units,
    Tens,
    Hundreds,
}

/// Unit words that may trail a number ("doze meses", "dez por cento").
const TRAILING_UNITS: &[&str] = &["mês", "mes", "meses", "%"];

/// Parse a spelled-out Portuguese cardinal ("dez", "vinte e quatro",
/// "cento e vinte"). Trailing unit words such as "por cento" or "meses" are
/// ignored. Returns `None` unless the rest is a well-formed compound:
/// hundreds, tens and units in that order, joined by "e".
pub fn parse_number_words(s: &str) -> Option<u32> {
    let lower = s.to_lowercase();
    let mut tokens: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == '-' || c == ',')
        .filter(|t| !t.is_empty())
        .collect();
    loop {
        let strip = match tokens.as_slice() {
            [.., last] if TRAILING_UNITS.contains(last) => 1,
            [.., "por", "cento"] => 2,
            _ => break,
        };
        tokens.truncate(tokens.len() - strip);
    }
    if tokens.len() % 2 == 0 {
        return None;
    }

    let mut total = 0;
    let mut prev: Option<(&str, Rank)> = None;
    for (i, &token) in tokens.iter().enumerate() {
        if i % 2 == 1 {
            if token != "e" {
                return None;
            }
            continue;
        }
        let (value, rank) = word_value(token)?;
        if let Some((prev_word, prev_rank)) = prev {
            // Teens may follow a hundred ("cento e dezoito") but not a ten.
            let fits = rank < prev_rank
                && value != 0
                && prev_word != "cem"
                && (prev_rank != Rank::Tens || value < 10);
            if !fits {
                return None;
            }
        }
        total += value;
        prev = Some((token, rank));
    }
    match prev {
        Some(("cento", _)) | None => None,
        Some(_) => Some(total),
    }
}

fn word_value(word: &str) -> Option<(u32, Rank)> {
    let v = match word {
        "zero" => 0,
        "um" | "uma" => 1,
        "dois" | "duas" => 2,
        "três" | "tres" => 3,
        "quatro" => 4,
        "cinco" => 5,
        "seis" => 6,
        "sete" => 7,
        "oito" => 8,
        "nove" => 9,
        "dez" => 10,
        "onze" => 11,
        "doze" => 12,
        "treze" => 13,
        "catorze" | "quatorze" => 14,
        "quinze" => 15,
        "dezesseis" | "dezasseis" => 16,
        "dezessete" | "dezassete" => 17,
        "dezoito" => 18,
        "dezenove" | "dezanove" => 19,
        "vinte" => 20,
        "trinta" => 30,
        "quarenta" => 40,
        "cinquenta" | "cinqüenta" => 50,
        "sessenta" => 60,
        "setenta" => 70,
        "oitenta" => 80,
        "noventa" => 90,
        "cem" | "cento" => 100,
        "duzentos" | "duzentas" => 200,
        "trezentos" | "trezentas" => 300,
        "quatrocentos" | "quatrocentas" => 400,
        "quinhentos" | "quinhentas" => 500,
        "seiscentos" | "seiscentas" => 600,
        "setecentos" | "setecentas" => 700,
        "oitocentos" | "oitocentas" => 800,
        "novecentos" | "novecentas" => 900,
        _ => return None,
    };
    let rank = match v {
        0..=19 => Rank::Units,
        20..=99 => Rank::Tens,
        _ => Rank::Hundreds,
    };
    Some((v, rank))
}
