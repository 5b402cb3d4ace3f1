const CHECK_LETTERS: &[u8; 11] = b"ABCDEFGHJKL";

/// Check character for the six digits of a grading code.
///
/// Digit `i` (from 0) is weighted `7 - i`; the weighted sum modulo 11
/// selects from `ABCDEFGHJKL`. Returns `None` unless `digits` is exactly six
/// ASCII digits.
pub fn check_character(digits: &str) -> Option<char> {
    let bytes = digits.as_bytes();
    if bytes.len() != 6 || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let sum: u32 = bytes
        .iter()
        .enumerate()
        .map(|(i, b)| u32::from(b - b'0') * (7 - i as u32))
        .sum();
    Some(char::from(CHECK_LETTERS[(sum % 11) as usize]))
}

/// True for six digits followed by their check character.
pub fn is_valid_grading_code(code: &str) -> bool {
    if code.len() != 7 || !code.is_ascii() {
        return false;
    }
    let (digits, check) = code.split_at(6);
    check_character(digits).is_some_and(|expected| check.starts_with(expected))
}
