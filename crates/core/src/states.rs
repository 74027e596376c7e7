/// IBGE numeric code for a UF (`cUF`).
pub fn ibge_code(uf: &str) -> Option<u8> {
    let code = match uf.trim().to_ascii_uppercase().as_str() {
        "RO" => 11,
        "AC" => 12,
        "AM" => 13,
        "RR" => 14,
        "PA" => 15,
        "AP" => 16,
        "TO" => 17,
        "MA" => 21,
        "PI" => 22,
        "CE" => 23,
        "RN" => 24,
        "PB" => 25,
        "PE" => 26,
        "AL" => 27,
        "SE" => 28,
        "BA" => 29,
        "MG" => 31,
        "ES" => 32,
        "RJ" => 33,
        "SP" => 35,
        "PR" => 41,
        "SC" => 42,
        "RS" => 43,
        "MS" => 50,
        "MT" => 51,
        "GO" => 52,
        "DF" => 53,
        _ => return None,
    };
    Some(code)
}

/// UF used for recipients abroad.
pub const FOREIGN_UF: &str = "EX";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_states_resolve() {
        assert_eq!(ibge_code("SP"), Some(35));
        assert_eq!(ibge_code("df"), Some(53));
        assert_eq!(ibge_code("XX"), None);
    }
}
