use super::*;

#[test]
#[cfg(unix)]
fn root_user_resolves_to_uid_zero() {
    assert_eq!(lookup_user("root"), Some((0, 0)));
    assert!(user_exists("root"));
}

#[test]
#[cfg(unix)]
fn unknown_principals_do_not_resolve() {
    assert!(!user_exists("warden-no-such-user"));
    assert!(!group_exists("warden-no-such-group"));
    assert_eq!(lookup_group("warden-no-such-group"), None);
}
