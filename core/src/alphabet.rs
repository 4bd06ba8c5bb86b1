/// Characters transportable over the link, in frequency order.
///
/// Index `i` is carried on `base_frequency + i * step`.
pub const ALPHABET: [char; 39] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', //
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', //
    'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', //
    'u', 'v', 'w', 'x', 'y', 'z', '@', '.', '_',
];

/// Number of symbols in the alphabet
pub const ALPHABET_SIZE: usize = ALPHABET.len();

/// Index of `c` in the alphabet, if it is transportable.
///
/// Lookup is exact: callers lower-case before asking.
pub fn index_of(c: char) -> Option<usize> {
    ALPHABET.iter().position(|&a| a == c)
}

/// Character carried at `index`
pub fn symbol_at(index: usize) -> Option<char> {
    ALPHABET.get(index).copied()
}

/// Lower-cased payload with every character the encoder would skip removed
pub fn strip_invalid(payload: &str) -> String {
    payload
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|&c| index_of(c).is_some())
        .collect()
}

/// Whether every character of `payload` survives encoding
pub fn is_transportable(payload: &str) -> bool {
    payload
        .chars()
        .flat_map(char::to_lowercase)
        .all(|c| index_of(c).is_some())
}
