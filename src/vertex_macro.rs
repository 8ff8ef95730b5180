#[macro_export]
macro_rules! declare_vertex {
    ($struct_name:ident; $prefix:literal; $id_field:ident: $id_ty:ty, $label_field:ident) => {
        #[derive(Debug, Clone, Eq, PartialEq, Hash)]
        #[doc = concat!("Graph vertex identified by `", $prefix, "<id>`.")]
        pub struct $struct_name {
            pub $id_field: $id_ty,
            pub $label_field: String,
        }

        impl $struct_name {
            pub const KEY_PREFIX: &'static str = $prefix;

            pub fn new($id_field: $id_ty, $label_field: &str) -> Self {
                Self {
                    $id_field,
                    $label_field: $label_field.to_string(),
                }
            }

            /// Identity key of the vertex with the given id.
            pub fn key_for($id_field: $id_ty) -> String {
                format!("{}{}", $prefix, $id_field)
            }

            pub fn key(&self) -> String {
                Self::key_for(self.$id_field)
            }
        }
    };
}
