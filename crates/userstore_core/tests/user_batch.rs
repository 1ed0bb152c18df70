use userstore_core::db::open_db_in_memory;
use userstore_core::{
    NewUser, RepoError, SqliteUserRepository, UserListQuery, UserPatch, UserRepository,
    UserService, UserValidationError,
};

#[test]
fn batch_create_skips_duplicates_and_inserts_the_rest() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = UserService::new(SqliteUserRepository::new(&mut conn));

    service.create_user(&NewUser::new("Ann", "ann@email.com")).unwrap();
    let summary = service
        .create_users(&[
            NewUser::new("Bob", "bob@email.com"),
            NewUser::new("Ann again", "ann@email.com"),
            NewUser::new("Cid", "cid@email.com"),
        ])
        .unwrap();

    assert_eq!(summary.inserted_count, 2);
    let emails: Vec<_> = service
        .list_users(&UserListQuery::default())
        .unwrap()
        .into_iter()
        .map(|user| user.email)
        .collect();
    assert_eq!(emails, vec!["ann@email.com", "bob@email.com", "cid@email.com"]);
}

#[test]
fn batch_create_without_skip_is_all_or_nothing() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteUserRepository::new(&mut conn);

    repo.create_user(&NewUser::new("Ann", "ann@email.com")).unwrap();
    let err = repo
        .create_users(
            &[
                NewUser::new("Bob", "bob@email.com"),
                NewUser::new("Ann again", "ann@email.com"),
            ],
            false,
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::Constraint(_)));
    assert_eq!(repo.count_users().unwrap(), 1);
}

#[test]
fn empty_batch_inserts_nothing() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = UserService::new(SqliteUserRepository::new(&mut conn));

    let summary = service.create_users(&[]).unwrap();
    assert_eq!(summary.inserted_count, 0);
    assert!(service.list_users(&UserListQuery::default()).unwrap().is_empty());
}

#[test]
fn batch_create_rejects_invalid_rows_before_inserting() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = UserService::new(SqliteUserRepository::new(&mut conn));

    assert!(matches!(
        service
            .create_users(&[NewUser::new("Ok", "ok@email.com"), NewUser::new("Bad", "bad")])
            .unwrap_err(),
        RepoError::Validation(UserValidationError::InvalidEmail(_))
    ));
    assert!(service.list_users(&UserListQuery::default()).unwrap().is_empty());
}

#[test]
fn deactivate_by_domain_touches_matches_only() {
    let mut conn = open_db_in_memory().unwrap();
    let service = UserService::new(SqliteUserRepository::new(&mut conn));

    let active_patch = UserPatch {
        is_active: Some(true),
        ..UserPatch::default()
    };
    let mut ids = Vec::new();
    for email in [
        "a@email.com",
        "b@email.com",
        "c@other.org",
        "d@notemail.com",
        "e@EMAIL.COM",
    ] {
        let user = service.create_user(&NewUser::new("User", email)).unwrap();
        service.update_user(user.id, &active_patch).unwrap();
        ids.push(user.id);
    }

    let summary = service.deactivate_by_domain("email.com").unwrap();
    assert_eq!(summary.matched_count, 2);

    let flags: Vec<_> = ids
        .iter()
        .map(|id| service.get_user(*id).unwrap().is_active)
        .collect();
    assert_eq!(
        flags,
        vec![Some(false), Some(false), Some(true), Some(true), Some(true)]
    );
}

#[test]
fn deactivate_by_domain_rejects_malformed_domain() {
    let mut conn = open_db_in_memory().unwrap();
    let service = UserService::new(SqliteUserRepository::new(&mut conn));

    let err = service.deactivate_by_domain("%").unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(UserValidationError::InvalidDomain(_))
    ));
}
