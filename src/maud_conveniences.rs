use crate::auth::{PermissionsTarget, RosterUser};
use maud::{Markup, Render, html};

pub fn render_nav(user: Option<&RosterUser>) -> Markup {
    let perms = user.map_or_else(PermissionsTarget::empty, RosterUser::get_permissions);
    let link = |href: &'static str, text: &'static str| {
        html! {
            a href=(href) class="text-gray-300 hover:bg-gray-700 hover:text-white px-3 py-2 rounded-md text-sm font-medium" {(text)}
        }
    };

    html! {
        nav class="bg-gray-800 w-full mb-8" {
            div class="mx-auto max-w-7xl px-4 flex h-16 items-center justify-between" {
                div class="flex items-baseline space-x-4" {
                    (link("/", "Home"))
                    @if perms.contains(PermissionsTarget::VIEW_OWN_ASSIGNMENTS) && !perms.contains(PermissionsTarget::RUN_DISTRIBUTION) {
                        (link("/my_visits", "My Visits"))
                    }
                    @if perms.contains(PermissionsTarget::CRUD_STUDENTS) {
                        (link("/students", "Students"))
                    }
                    @if perms.contains(PermissionsTarget::CRUD_BENEFICIARIES) {
                        (link("/beneficiaries", "Beneficiaries"))
                    }
                    @if perms.contains(PermissionsTarget::RUN_DISTRIBUTION) {
                        (link("/assignments", "Assignments"))
                    }
                    @if perms.contains(PermissionsTarget::IMPORT_CSVS) {
                        (link("/import", "Import"))
                    }
                    @if perms.contains(PermissionsTarget::RESOLVE_REQUESTS) {
                        (link("/requests", "Requests"))
                    }
                    @if perms.contains(PermissionsTarget::VIEW_PROGRESS) {
                        (link("/progress", "Progress"))
                    }
                    @if perms.contains(PermissionsTarget::EDIT_SETTINGS) {
                        (link("/settings", "Settings"))
                    }
                }
                div class="flex items-center space-x-4" {
                    @if let Some(user) = user {
                        span class="text-gray-400 text-sm" {(user.display_name())}
                        form method="post" action="/logout" {
                            button type="submit" class="bg-red-700 hover:bg-red-800 px-3 py-2 rounded-md text-sm font-medium" {"Logout"}
                        }
                    } @else {
                        (link("/login", "Login"))
                    }
                }
            }
        }
    }
}

pub fn title(s: impl Render) -> Markup {
    html! {
        h1 class="text-2xl font-semibold mb-4" {(s)}
    }
}

pub fn subtitle(s: impl Render) -> Markup {
    html! {
        h2 class="text-xl font-semibold mb-2" {(s)}
    }
}

pub fn table<const N: usize>(
    overall_title: impl Render,
    titles: [&'static str; N],
    items: Vec<[impl Render; N]>,
) -> Markup {
    html! {
        div class="container mx-auto" {
            (overall_title)
            div class="overflow-x-auto" {
                table class="min-w-full bg-gray-800 rounded shadow-md" {
                    thead class="bg-gray-700" {
                        tr {
                            @for title in titles {
                                th class="py-2 px-4 text-left font-semibold text-gray-300" {(title)}
                            }
                        }
                    }
                    tbody {
                        @for row in items {
                            tr {
                                @for col in row {
                                    td class="py-2 px-4 border-b border-gray-600 text-gray-200" {(col)}
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

pub fn errors_list(
    heading: Option<&str>,
    errors: impl Iterator<Item = impl Render>,
) -> Markup {
    html! {
        div role="alert" class="bg-red-100 border border-red-400 text-red-700 px-4 py-4 rounded relative mb-4" {
            @if let Some(heading) = heading {
                strong class="font-bold" {(heading)}
            }
            ul class="list-disc list-inside" {
                @for error in errors {
                    li {(error)}
                }
            }
        }
    }
}

pub fn notice(text: impl Render) -> Markup {
    html! {
        div class="flex flex-col m-4 p-4 space-y-4 rounded shadow items-center justify-center text-center bg-gray-800" {
            p {(text)}
        }
    }
}

pub fn form_element(id: &'static str, label: &'static str, input: Markup) -> Markup {
    html! {
        div class="mb-4" {
            label for=(id) class="block text-sm font-bold mb-2 text-gray-300" {(label)}
            (input)
        }
    }
}

pub fn simple_form_element(
    id: &'static str,
    label: &'static str,
    required: bool,
    input_type: Option<&'static str>,
    value: Option<&str>,
) -> Markup {
    form_element(
        id,
        label,
        html! {
            input type=(input_type.unwrap_or("text")) id=(id) name=(id) required[required] value=[value]
                class="shadow appearance-none border rounded w-full py-2 px-3 leading-tight focus:outline-none focus:shadow-outline bg-gray-700 border-gray-600" {}
        },
    )
}

pub fn form_submit_button(text: Option<&str>) -> Markup {
    html! {
        div class="flex items-center justify-between" {
            button type="submit" class="bg-blue-500 hover:bg-blue-700 font-bold py-2 px-4 rounded focus:outline-none focus:shadow-outline" {
                (text.unwrap_or("Submit"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_nav_only_offers_login() {
        let nav = render_nav(None).into_string();
        assert!(nav.contains("/login"));
        assert!(!nav.contains("/assignments"));
        assert!(!nav.contains("/my_visits"));
    }

    #[test]
    fn form_values_are_escaped() {
        let markup =
            simple_form_element("name", "Name", true, None, Some("<script>")).into_string();
        assert!(markup.contains("&lt;script&gt;"));
        assert!(markup.contains("required"));
    }
}
