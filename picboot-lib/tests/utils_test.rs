use picboot_lib::Error;
use picboot_lib::device::AddressRange;
use picboot_lib::utils::Utils;

#[test]
fn test_str_to_u32_radixes() {
    assert_eq!(Utils::str_to_u32("1234").unwrap(), 1234);
    assert_eq!(Utils::str_to_u32("0x1F00").unwrap(), 0x1F00);
    assert_eq!(Utils::str_to_u32("0X1f00").unwrap(), 0x1F00);
    assert_eq!(Utils::str_to_u32("0b1010").unwrap(), 10);
    assert_eq!(Utils::str_to_u32("0o17").unwrap(), 15);
    assert_eq!(Utils::str_to_u32(" 64k ").unwrap(), 65536);
}

#[test]
fn test_str_to_u32_hex_ending_in_letter_is_not_a_suffix() {
    assert_eq!(Utils::str_to_u32("0x3FFFF").unwrap(), 0x3FFFF);
    assert!(Utils::str_to_u32("0xZZ").is_err());
    assert!(Utils::str_to_u32("").is_err());
}

#[test]
fn test_parse_range() {
    assert_eq!(
        Utils::parse_range("0x400:0x7FFF").unwrap(),
        AddressRange::new(0x400, 0x7FFF)
    );
    assert_eq!(
        Utils::parse_range(" 0 : 255 ").unwrap(),
        AddressRange::new(0, 255)
    );
}

#[test]
fn test_parse_range_rejects_bad_input() {
    assert!(matches!(
        Utils::parse_range("0x400"),
        Err(Error::Parameter(_))
    ));
    assert!(matches!(
        Utils::parse_range("0x800:0x400"),
        Err(Error::Parameter(_))
    ));
    assert!(matches!(
        Utils::parse_range("abc:0x400"),
        Err(Error::Parameter(_))
    ));
}
