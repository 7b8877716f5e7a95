//! Move-token handling: SAN syntax validation, check markers and
//! three-move sequence windows.

use cozy_chess::{File, Piece, Rank, Square};

/// Separator used when joining three consecutive moves into a sequence key.
pub const SEQUENCE_SEPARATOR: char = '>';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SanError {
    #[error("empty move")]
    Empty,
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error("invalid square: {0}")]
    InvalidSquare(String),
    #[error("invalid promotion: {0}")]
    InvalidPromotion(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMarker {
    None,
    Check,
    Mate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanMove {
    Castle {
        long: bool,
    },
    Normal {
        piece: Piece,
        to: Square,
        capture: bool,
        promotion: Option<Piece>,
    },
}

/// A syntactically valid SAN token. No board legality is implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedSan {
    pub mv: SanMove,
    pub marker: CheckMarker,
}

/// Parse a SAN token such as `e4`, `Nbxd7+`, `exd8=Q#` or `O-O-O`.
pub fn parse_san(token: &str) -> Result<ParsedSan, SanError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(SanError::Empty);
    }

    let body = token.trim_end_matches(['!', '?']);
    let (body, marker) = if let Some(rest) = body.strip_suffix('#') {
        (rest, CheckMarker::Mate)
    } else if let Some(rest) = body.strip_suffix('+') {
        (rest, CheckMarker::Check)
    } else {
        (body, CheckMarker::None)
    };

    let mv = match body {
        "O-O" | "0-0" => SanMove::Castle { long: false },
        "O-O-O" | "0-0-0" => SanMove::Castle { long: true },
        _ => parse_normal(body, token)?,
    };
    Ok(ParsedSan { mv, marker })
}

fn parse_normal(body: &str, token: &str) -> Result<SanMove, SanError> {
    let chars: Vec<char> = body.chars().collect();
    let Some(&first) = chars.first() else {
        return Err(SanError::InvalidFormat(token.to_string()));
    };

    let (piece, rest) = match parse_piece_letter(first) {
        Some(piece) => (piece, &chars[1..]),
        None => (Piece::Pawn, &chars[..]),
    };

    // Split off a pawn promotion suffix ("=Q" or bare "Q").
    let (rest, promotion) = match rest {
        [head @ .., '=', p] | [head @ .., p] if piece == Piece::Pawn && p.is_ascii_uppercase() => {
            match parse_piece_letter(*p) {
                Some(Piece::Pawn) | Some(Piece::King) | None => {
                    return Err(SanError::InvalidPromotion(token.to_string()))
                }
                Some(promo) => (head, Some(promo)),
            }
        }
        _ => (rest, None),
    };

    if rest.len() < 2 {
        return Err(SanError::InvalidFormat(token.to_string()));
    }
    let (prefix, dest) = rest.split_at(rest.len() - 2);
    let to = parse_square(dest[0], dest[1])
        .ok_or_else(|| SanError::InvalidSquare(dest.iter().collect()))?;

    let (prefix, capture) = match prefix {
        [head @ .., 'x'] => (head, true),
        _ => (prefix, false),
    };

    let disambiguation_ok = match (piece, prefix) {
        (_, []) => true,
        (Piece::Pawn, [f]) => capture && parse_file(*f).is_some(),
        (Piece::Pawn, _) => false,
        (_, [c]) => parse_file(*c).is_some() || parse_rank(*c).is_some(),
        (_, [f, r]) => parse_square(*f, *r).is_some(),
        _ => false,
    };
    // A pawn capture must name its source file.
    let pawn_capture_ok = piece != Piece::Pawn || !capture || prefix.len() == 1;
    if !disambiguation_ok || !pawn_capture_ok {
        return Err(SanError::InvalidFormat(token.to_string()));
    }
    if promotion.is_some() && !matches!(to.rank(), Rank::First | Rank::Eighth) {
        return Err(SanError::InvalidPromotion(token.to_string()));
    }

    Ok(SanMove::Normal {
        piece,
        to,
        capture,
        promotion,
    })
}

fn parse_piece_letter(c: char) -> Option<Piece> {
    match c {
        'K' => Some(Piece::King),
        'Q' => Some(Piece::Queen),
        'R' => Some(Piece::Rook),
        'B' => Some(Piece::Bishop),
        'N' => Some(Piece::Knight),
        'P' => Some(Piece::Pawn),
        _ => None,
    }
}

fn parse_file(c: char) -> Option<File> {
    if !c.is_ascii_lowercase() {
        return None;
    }
    File::try_index((c as u8 - b'a') as usize)
}

fn parse_rank(c: char) -> Option<Rank> {
    let digit = c.to_digit(10)? as usize;
    digit.checked_sub(1).and_then(Rank::try_index)
}

fn parse_square(file: char, rank: char) -> Option<Square> {
    Some(Square::new(parse_file(file)?, parse_rank(rank)?))
}

/// Whether a raw move token carries a check or checkmate marker.
pub fn has_check_marker(token: &str) -> bool {
    token.contains(['+', '#'])
}

/// Every contiguous window of three moves, joined as `m1>m2>m3`.
pub fn sequence_windows(moves: &[String]) -> impl Iterator<Item = String> + '_ {
    moves.windows(3).map(|w| {
        let mut key = String::with_capacity(w.iter().map(|m| m.len() + 1).sum());
        for (i, m) in w.iter().enumerate() {
            if i > 0 {
                key.push(SEQUENCE_SEPARATOR);
            }
            key.push_str(m);
        }
        key
    })
}

/// Join three moves into a sequence key.
pub fn sequence_key(m1: &str, m2: &str, m3: &str) -> String {
    format!("{m1}{SEQUENCE_SEPARATOR}{m2}{SEQUENCE_SEPARATOR}{m3}")
}
