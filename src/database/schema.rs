table! {
    notifications (id) {
        id -> Int4,
        user_id -> Text,
        title -> Text,
        message -> Text,
        kind -> Text,
        status -> Text,
        created_at -> Timestamptz,
    }
}

table! {
    subscriptions (id) {
        id -> Int4,
        user_id -> Text,
        kind -> Text,
        enabled -> Bool,
        enable_sound -> Bool,
        enable_browser -> Bool,
        enable_email -> Bool,
        delivery_token -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    users (id) {
        id -> Text,
        username -> Text,
        email -> Text,
        first_name -> Text,
        last_name -> Text,
        created_at -> Timestamptz,
    }
}

joinable!(notifications -> users (user_id));
joinable!(subscriptions -> users (user_id));

allow_tables_to_appear_in_same_query!(notifications, subscriptions, users,);
