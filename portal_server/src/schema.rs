//! Diesel table definitions for the portal.
//!
//! Tables mirror `migration::MIGRATION_SQL`. Every table uses a BIGSERIAL
//! `id` except `rate_limits`, which is keyed by the limiter bucket.

diesel::table! {
    users (id) {
        id -> Int8,
        email -> Varchar,
        password_hash -> Varchar,
        display_name -> Varchar,
        role -> Varchar,
        active -> Bool,
        failed_logins -> Int4,
        locked_until -> Nullable<Timestamptz>,
        last_login_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    sessions (id) {
        id -> Int8,
        token_hash -> Varchar,
        user_id -> Int8,
        ip -> Nullable<Varchar>,
        user_agent -> Nullable<Varchar>,
        expires_at -> Timestamptz,
        last_seen_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    rate_limits (key) {
        key -> Varchar,
        count -> Int4,
        reset_at -> Timestamptz,
    }
}

diesel::table! {
    security_policies (id) {
        id -> Int8,
        key -> Varchar,
        password_min_length -> Int4,
        session_ttl_hours -> Int4,
        max_login_attempts -> Int4,
        lockout_minutes -> Int4,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    products (id) {
        id -> Int8,
        name -> Varchar,
        slug -> Varchar,
        description -> Nullable<Text>,
        price_cents -> Int8,
        currency -> Varchar,
        stock -> Nullable<Int4>,
        active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    purchases (id) {
        id -> Int8,
        user_id -> Int8,
        product_id -> Int8,
        quantity -> Int4,
        total_cents -> Int8,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    contents (id) {
        id -> Int8,
        kind -> Varchar,
        title -> Varchar,
        slug -> Varchar,
        summary -> Nullable<Text>,
        body -> Text,
        cover_url -> Nullable<Varchar>,
        metadata -> Nullable<Jsonb>,
        starts_at -> Nullable<Timestamptz>,
        ends_at -> Nullable<Timestamptz>,
        location -> Nullable<Varchar>,
        published -> Bool,
        author_id -> Nullable<Int8>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    semesters (id) {
        id -> Int8,
        name -> Varchar,
        starts_on -> Date,
        ends_on -> Date,
        is_current -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    hall_of_fame (id) {
        id -> Int8,
        user_id -> Nullable<Int8>,
        name -> Varchar,
        title -> Varchar,
        description -> Nullable<Text>,
        image_url -> Nullable<Varchar>,
        rank -> Int4,
        semester_id -> Nullable<Int8>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    roadmaps (id) {
        id -> Int8,
        title -> Varchar,
        slug -> Varchar,
        description -> Nullable<Text>,
        published -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    roadmap_levels (id) {
        id -> Int8,
        roadmap_id -> Int8,
        title -> Varchar,
        position -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    roadmap_milestones (id) {
        id -> Int8,
        level_id -> Int8,
        title -> Varchar,
        description -> Nullable<Text>,
        position -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    roadmap_challenges (id) {
        id -> Int8,
        milestone_id -> Int8,
        title -> Varchar,
        description -> Nullable<Text>,
        points -> Int4,
        position -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    enrollments (id) {
        id -> Int8,
        user_id -> Int8,
        roadmap_id -> Int8,
        semester_id -> Nullable<Int8>,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    challenge_completions (id) {
        id -> Int8,
        enrollment_id -> Int8,
        challenge_id -> Int8,
        completed_at -> Timestamptz,
    }
}

diesel::table! {
    telegram_users (id) {
        id -> Int8,
        telegram_id -> Int8,
        chat_id -> Int8,
        username -> Nullable<Varchar>,
        user_id -> Nullable<Int8>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    notification_templates (id) {
        id -> Int8,
        name -> Varchar,
        subject -> Varchar,
        body -> Text,
        channel -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    notification_campaigns (id) {
        id -> Int8,
        name -> Varchar,
        template_id -> Int8,
        audience -> Varchar,
        status -> Varchar,
        scheduled_at -> Nullable<Timestamptz>,
        sent_at -> Nullable<Timestamptz>,
        recipients -> Int4,
        failures -> Int4,
        created_by -> Nullable<Int8>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    user_notifications (id) {
        id -> Int8,
        user_id -> Int8,
        campaign_id -> Nullable<Int8>,
        subject -> Text,
        body -> Text,
        read_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    workflows (id) {
        id -> Int8,
        name -> Varchar,
        trigger_event -> Varchar,
        template_id -> Int8,
        active -> Bool,
        runs -> Int4,
        last_run_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    journals (id) {
        id -> Int8,
        user_id -> Int8,
        title -> Varchar,
        body -> Text,
        mood -> Nullable<Int2>,
        entry_date -> Date,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(sessions -> users (user_id));
diesel::joinable!(purchases -> users (user_id));
diesel::joinable!(purchases -> products (product_id));
diesel::joinable!(roadmap_levels -> roadmaps (roadmap_id));
diesel::joinable!(roadmap_milestones -> roadmap_levels (level_id));
diesel::joinable!(roadmap_challenges -> roadmap_milestones (milestone_id));
diesel::joinable!(enrollments -> users (user_id));
diesel::joinable!(enrollments -> roadmaps (roadmap_id));
diesel::joinable!(challenge_completions -> enrollments (enrollment_id));
diesel::joinable!(telegram_users -> users (user_id));
diesel::joinable!(notification_campaigns -> notification_templates (template_id));
diesel::joinable!(user_notifications -> users (user_id));
diesel::joinable!(workflows -> notification_templates (template_id));
diesel::joinable!(journals -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    sessions,
    rate_limits,
    security_policies,
    products,
    purchases,
    contents,
    semesters,
    hall_of_fame,
    roadmaps,
    roadmap_levels,
    roadmap_milestones,
    roadmap_challenges,
    enrollments,
    challenge_completions,
    telegram_users,
    notification_templates,
    notification_campaigns,
    user_notifications,
    workflows,
    journals,
);
