// Mirrors the embedded migrations under `migrations/`.
diesel::table! {
    parents (parent_id) {
        parent_id -> Text,
        email -> Text,
        password_hash -> Text,
        first_name -> Text,
        last_name -> Text,
        email_verified -> Bool,
        email_verified_at -> Nullable<Text>,
        password_reset_token_hash -> Nullable<Text>,
        password_reset_expires -> Nullable<Text>,
        account_status -> Text,
        timezone -> Text,
        language -> Text,
        privacy_consent -> Bool,
        marketing_consent -> Bool,
        data_retention_consent -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    children (child_id) {
        child_id -> Text,
        parent_id -> Text,
        first_name -> Text,
        birth_date -> Nullable<Text>,
        avatar_url -> Nullable<Text>,
        reward_points -> Integer,
        level -> Integer,
        preferred_difficulty -> Text,
        is_active -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    categories (category_id) {
        category_id -> Text,
        parent_id -> Text,
        name -> Text,
        description -> Nullable<Text>,
        color -> Text,
        icon -> Text,
        is_default -> Bool,
        sort_order -> Integer,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    tasks (task_id) {
        task_id -> Text,
        parent_id -> Text,
        child_id -> Nullable<Text>,
        category_id -> Nullable<Text>,
        title -> Text,
        description -> Nullable<Text>,
        due_date -> Nullable<Text>,
        recurrence_pattern -> Nullable<Text>,
        priority -> Text,
        difficulty -> Text,
        estimated_duration -> Nullable<Integer>,
        reward_points -> Integer,
        status -> Text,
        completion_date -> Nullable<Text>,
        completion_notes -> Nullable<Text>,
        assigned_at -> Nullable<Text>,
        requires_verification -> Bool,
        verification_notes -> Nullable<Text>,
        verified_by -> Nullable<Text>,
        verified_at -> Nullable<Text>,
        credited_points -> Nullable<Integer>,
        parent_task_id -> Nullable<Text>,
        sequence_number -> Integer,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    task_comments (comment_id) {
        comment_id -> Text,
        task_id -> Text,
        author_id -> Text,
        author_type -> Text,
        content -> Text,
        is_private -> Bool,
        attachment_url -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    rewards (reward_id) {
        reward_id -> Text,
        parent_id -> Text,
        child_id -> Nullable<Text>,
        name -> Text,
        description -> Nullable<Text>,
        cost_points -> Integer,
        category -> Text,
        icon -> Text,
        color -> Text,
        is_active -> Bool,
        max_redemptions -> Nullable<Integer>,
        redemption_count -> Integer,
        available_from -> Nullable<Text>,
        available_until -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    reward_redemptions (redemption_id) {
        redemption_id -> Text,
        reward_id -> Text,
        child_id -> Text,
        points_spent -> Integer,
        redeemed_at -> Text,
        status -> Text,
        approved_by -> Nullable<Text>,
        approved_at -> Nullable<Text>,
        fulfilled_at -> Nullable<Text>,
        notes -> Nullable<Text>,
        request_key -> Nullable<Text>,
    }
}

diesel::table! {
    notifications (notification_id) {
        notification_id -> Text,
        recipient_id -> Text,
        recipient_type -> Text,
        title -> Text,
        message -> Text,
        kind -> Text,
        priority -> Text,
        is_read -> Bool,
        read_at -> Nullable<Text>,
        related_task_id -> Nullable<Text>,
        related_reward_id -> Nullable<Text>,
        related_child_id -> Nullable<Text>,
        delivery_method -> Text,
        delivered_at -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    email_verification_tokens (token_id) {
        token_id -> Text,
        parent_id -> Text,
        email -> Text,
        token_hash -> Text,
        expires_at -> Text,
        used_at -> Nullable<Text>,
        invalidated_at -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    schema_migrations (version) {
        version -> BigInt,
        name -> Text,
        checksum -> Text,
        applied_at -> Text,
    }
}

diesel::joinable!(children -> parents (parent_id));
diesel::joinable!(categories -> parents (parent_id));
diesel::joinable!(tasks -> children (child_id));
diesel::joinable!(tasks -> categories (category_id));
diesel::joinable!(task_comments -> tasks (task_id));
diesel::joinable!(rewards -> children (child_id));
diesel::joinable!(reward_redemptions -> rewards (reward_id));
diesel::joinable!(reward_redemptions -> children (child_id));
diesel::joinable!(email_verification_tokens -> parents (parent_id));

diesel::allow_tables_to_appear_in_same_query!(
    parents,
    children,
    categories,
    tasks,
    task_comments,
    rewards,
    reward_redemptions,
    notifications,
    email_verification_tokens,
);
