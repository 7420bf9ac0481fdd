//! The application's schema versions.
//!
//! Append new versions at the end. Once a version has been released it is
//! never edited; fix mistakes with a new version. Keep names lowercase with
//! underscores and tables plural. One logical change per version.

use crate::migrations::{SchemaVersion, LEDGER_VERSION};

/// Every schema version, oldest first. The index is the version number.
pub const VERSIONS: &[SchemaVersion] = &[
    LEDGER_VERSION,
    SchemaVersion {
        apply: "
            create table logs (
                id {{id}} PRIMARY KEY NOT NULL,
                occurred {{datetime}} NOT NULL,
                message {{text}} NOT NULL
            )
        ",
        rollback: "drop table logs",
    },
    SchemaVersion {
        apply: "create index i_occurred on logs (occurred)",
        rollback: "
            {{if or mysql mariadb sqlserver}}
                drop index i_occurred on logs
            {{else if cockroachdb}}
                drop index logs@i_occurred
            {{else}}
                drop index i_occurred
            {{end}}
        ",
    },
    SchemaVersion {
        apply: "
            create table settings (
                id {{varchar 64}} PRIMARY KEY NOT NULL,
                description {{text}} NOT NULL,
                value {{text}} NOT NULL
            )
        ",
        rollback: "drop table settings",
    },
    SchemaVersion {
        apply: "
            insert into settings (id, description, value)
            values ('schema.dialect', 'Database kind the schema was created on', '{{db}}')
        ",
        rollback: "delete from settings where id = 'schema.dialect'",
    },
    SchemaVersion {
        apply: "
            create table users (
                id {{id}} PRIMARY KEY NOT NULL,
                username {{varchar \"user.username\"}} NOT NULL,
                name {{varchar \"user.name\"}},
                auth_type {{text}} NOT NULL,
                password {{bytes}},
                password_version {{int}},
                password_expiration {{datetime}},
                active {{bool}},
                admin {{bool}} DEFAULT {{FALSE}} NOT NULL,
                version {{int}} NOT NULL,
                updated {{datetime}} NOT NULL,
                created {{datetime}} NOT NULL
            )
        ",
        rollback: "drop table users",
    },
    SchemaVersion {
        apply: "
            create table sessions (
                id {{varchar 32}} NOT NULL,
                user_id {{id}} NOT NULL REFERENCES users(id),
                valid {{bool}} DEFAULT {{TRUE}} NOT NULL,
                expires {{datetime}} NOT NULL,
                ip_address {{text}} NOT NULL,
                user_agent {{text}},
                csrf_token {{text}} NOT NULL,
                csrf_date {{datetime}} NOT NULL,
                updated {{datetime}} NOT NULL,
                created {{datetime}} NOT NULL,
                PRIMARY KEY (id, user_id)
            )
        ",
        rollback: "drop table sessions",
    },
    SchemaVersion {
        apply: "create index i_username on users (username)",
        rollback: "
            {{if or mysql mariadb sqlserver}}
                drop index i_username on users
            {{else if cockroachdb}}
                drop index users@i_username
            {{else}}
                drop index i_username
            {{end}}
        ",
    },
    SchemaVersion {
        apply: "
            create table images (
                id {{id}} PRIMARY KEY NOT NULL,
                name {{text}} NOT NULL,
                version {{int}} NOT NULL,
                content_type {{text}} NOT NULL,
                data {{bytes}} NOT NULL,
                thumb {{bytes}} NOT NULL,
                placeholder {{bytes}} NOT NULL,
                updated {{datetime}} NOT NULL,
                created {{datetime}} NOT NULL
            )
        ",
        rollback: "drop table images",
    },
    SchemaVersion {
        apply: "
            {{if cockroachdb}}
                alter table users add column profile_image_id {{id}};
                create index i_profile_image on users (profile_image_id);
                alter table users add foreign key (profile_image_id) references images(id)
            {{else if sqlite}}
                {{/* sqlite cannot drop a column that carries a foreign key */}}
                alter table users add profile_image_id {{id}}
            {{else}}
                alter table users add profile_image_id {{id}} REFERENCES images(id)
            {{end}}
        ",
        rollback: "
            {{if cockroachdb}}
                drop index users@i_profile_image cascade;
                alter table users drop column profile_image_id
            {{else}}
                alter table users drop column profile_image_id
            {{end}}
        ",
    },
    SchemaVersion {
        apply: "
            create table groups (
                id {{id}} PRIMARY KEY NOT NULL,
                name {{varchar \"group.name\"}} UNIQUE NOT NULL,
                version {{int}} NOT NULL,
                updated {{datetime}} NOT NULL,
                created {{datetime}} NOT NULL
            )
        ",
        rollback: "drop table groups",
    },
    SchemaVersion {
        apply: "
            create table group_users (
                user_id {{id}} NOT NULL REFERENCES users(id),
                group_id {{id}} NOT NULL REFERENCES groups(id),
                admin {{bool}},
                PRIMARY KEY (user_id, group_id)
            )
        ",
        rollback: "drop table group_users",
    },
    SchemaVersion {
        apply: "
            insert into logs (id, occurred, message)
            values ('00000000-0000-0000-0000-000000000000', {{NOW}}, 'schema created on {{db}}')
        ",
        rollback: "delete from logs where id = '00000000-0000-0000-0000-000000000000'",
    },
];
